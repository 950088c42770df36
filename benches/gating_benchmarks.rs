use std::collections::BTreeSet;
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use wren::bridge::directory::union_remote_groups;
use wren::bridge::relay::filter_bridged;
use wren::bridge::{BatchInvalidation, BridgeRpc, GroupName, NodeInfo, RpcPacket};
use wren::node::NodeName;

fn cluster_entries(nodes: usize, groups_per_node: usize) -> Vec<NodeInfo> {
    (0..nodes)
        .map(|n| {
            let groups = (0..groups_per_node)
                .map(|g| GroupName::from(format!("group-{}", (n * 7 + g) % 200)))
                .collect();
            NodeInfo::new(NodeName::from(format!("node-{}", n)), groups)
        })
        .collect()
}

fn benchmark_union_remote_groups(c: &mut Criterion) {
    let entries = cluster_entries(32, 20);
    let local = NodeName::from("node-0");

    c.bench_function("union_remote_groups_32_nodes", |b| {
        b.iter(|| black_box(union_remote_groups(&local, entries.iter().cloned())))
    });
}

fn benchmark_filter_bridged(c: &mut Criterion) {
    let bridged: BTreeSet<GroupName> = (0..100)
        .map(|g| GroupName::from(format!("group-{}", g * 2)))
        .collect();
    let items: Vec<BatchInvalidation> = (0..64)
        .map(|i| {
            BatchInvalidation::new(
                GroupName::from(format!("group-{}", i * 3)),
                vec![format!("key-{}", i).into()],
            )
        })
        .collect();

    c.bench_function("filter_bridged_64_items", |b| {
        b.iter(|| black_box(filter_bridged(items.clone(), &bridged)))
    });
}

fn benchmark_packet_encoding(c: &mut Criterion) {
    let packet = RpcPacket::new(
        NodeName::from("node-a"),
        BridgeRpc::InvalidateMany {
            group: GroupName::from("Orders"),
            keys: (0..16).map(|k| format!("order:{}", k).into()).collect(),
        },
    );

    c.bench_function("rpc_packet_serialize", |b| {
        b.iter(|| black_box(packet.serialize()))
    });

    let bytes = packet.serialize().unwrap_or_default();
    c.bench_function("rpc_packet_deserialize", |b| {
        b.iter(|| black_box(RpcPacket::deserialize(&bytes)))
    });
}

criterion_group!(
    benches,
    benchmark_union_remote_groups,
    benchmark_filter_bridged,
    benchmark_packet_encoding
);
criterion_main!(benches);
