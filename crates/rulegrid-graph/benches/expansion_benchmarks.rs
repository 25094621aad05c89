use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rulegrid_core::{
    CellAddress, CellValue, ColumnId, ConstraintType, ExpansionConfig, GroupContext,
    GroupSelector, Netclass,
};
use rulegrid_graph::{GroupExpansionEngine, LinkageGraph, RelationMatrixStore};
use std::hint::black_box;

/// Store with `n` netclasses on one interface and a filled diagonal.
fn create_store(n: usize) -> RelationMatrixStore {
    let mut store = RelationMatrixStore::default();
    let bus = store.add_interface("BUS", "").unwrap();
    let netclasses = (0..n)
        .map(|i| Netclass::new(format!("NET_{}", i), bus).with_segment(format!("seg{}", i % 8)))
        .collect();
    let ids = store.add_netclasses(netclasses).unwrap();
    for id in ids {
        store
            .set_cell(
                CellAddress::clearance(id, ColumnId::Netclass(id)),
                CellValue::Number(0.1),
            )
            .unwrap();
    }
    store
}

fn bench_expand(c: &mut Criterion) {
    let engine = GroupExpansionEngine::new(ExpansionConfig::default());
    let contexts = vec![
        GroupContext::clearance(GroupSelector::All, GroupSelector::All, CellValue::Number(0.2)),
        GroupContext::clearance(GroupSelector::All, GroupSelector::All, CellValue::Number(0.3)),
    ];

    let mut group = c.benchmark_group("expansion_plan");
    for &n in &[32usize, 128] {
        let store = create_store(n);
        let linkage = LinkageGraph::new();
        group.throughput(Throughput::Elements((n * n) as u64));
        group.bench_with_input(BenchmarkId::new("all_to_all", n), &n, |b, _| {
            b.iter(|| black_box(engine.expand(&store, &linkage, black_box(&contexts)).unwrap()))
        });
    }
    group.finish();
}

fn bench_linkage(c: &mut Criterion) {
    let mut group = c.benchmark_group("linkage");
    for &n in &[64usize, 512] {
        let store = create_store(n);
        let cells: Vec<_> = store.cells().map(|cell| cell.id).collect();

        group.bench_with_input(BenchmarkId::new("link_pairs_then_merge", n), &n, |b, _| {
            b.iter(|| {
                let mut linkage = LinkageGraph::new();
                for pair in cells.chunks(2) {
                    linkage
                        .link(pair, ConstraintType::Clearance, &store)
                        .unwrap();
                }
                linkage
                    .link(&cells, ConstraintType::Clearance, &store)
                    .unwrap();
                black_box(linkage)
            })
        });

        let mut linked = LinkageGraph::new();
        linked
            .link(&cells, ConstraintType::Clearance, &store)
            .unwrap();
        let mut target = store.clone();
        group.bench_with_input(BenchmarkId::new("propagate", n), &n, |b, _| {
            b.iter(|| {
                black_box(
                    linked
                        .propagate(cells[0], CellValue::Number(0.4), &mut target)
                        .unwrap(),
                )
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_expand, bench_linkage);
criterion_main!(benches);
