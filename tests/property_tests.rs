use std::collections::BTreeSet;

use proptest::prelude::*;

use wren::bridge::directory::union_remote_groups;
use wren::bridge::relay::filter_bridged;
use wren::bridge::{BatchInvalidation, BridgeRpc, GroupName, NodeInfo, RpcPacket};
use wren::node::NodeName;

fn group_names() -> impl Strategy<Value = BTreeSet<GroupName>> {
    prop::collection::btree_set("[A-Z][a-z]{0,6}".prop_map(GroupName::from), 0..6)
}

fn node_infos() -> impl Strategy<Value = Vec<NodeInfo>> {
    prop::collection::vec(
        ("node-[a-e]", group_names())
            .prop_map(|(node, groups)| NodeInfo::new(NodeName::from(node), groups)),
        0..8,
    )
}

proptest! {
    #[test]
    fn test_union_never_contains_only_local_groups(
        local in "node-[a-e]",
        infos in node_infos()
    ) {
        let local = NodeName::from(local);
        let bridged = union_remote_groups(&local, infos.clone());

        let remote: BTreeSet<GroupName> = infos
            .iter()
            .filter(|info| info.node_id != local)
            .flat_map(|info| info.groups.iter().cloned())
            .collect();
        prop_assert_eq!(&bridged, &remote);

        // every bridged group is owned by some other node
        for group in &bridged {
            prop_assert!(infos
                .iter()
                .any(|info| info.node_id != local && info.groups.contains(group)));
        }
    }

    #[test]
    fn test_union_is_order_independent(
        local in "node-[a-e]",
        infos in node_infos()
    ) {
        let local = NodeName::from(local);
        let forward = union_remote_groups(&local, infos.clone());
        let reversed = union_remote_groups(&local, infos.into_iter().rev());
        prop_assert_eq!(forward, reversed);
    }

    #[test]
    fn test_filter_keeps_exactly_bridged_items(
        bridged in group_names(),
        groups in prop::collection::vec("[A-Z][a-z]{0,6}", 0..10)
    ) {
        let items: Vec<BatchInvalidation> = groups
            .iter()
            .map(|group| BatchInvalidation::new(group.as_str().into(), vec!["k".into()]))
            .collect();
        let expected: Vec<BatchInvalidation> = items
            .iter()
            .filter(|item| bridged.contains(&item.group))
            .cloned()
            .collect();

        let kept = filter_bridged(items, &bridged);
        prop_assert!(kept.iter().all(|item| bridged.contains(&item.group)));
        prop_assert_eq!(kept, expected);
    }

    #[test]
    fn test_decoding_arbitrary_bytes_never_panics(
        data in prop::collection::vec(any::<u8>(), 0..256)
    ) {
        let _ = RpcPacket::deserialize(&data);
        let _ = NodeInfo::decode(&data);
    }

    #[test]
    fn test_packet_survives_the_wire(
        sender in "node-[a-z]{1,8}",
        group in "[A-Z][a-z]{0,6}",
        keys in prop::collection::vec("[a-z0-9:-]{1,12}", 1..5)
    ) {
        let op = BridgeRpc::InvalidateMany {
            group: group.into(),
            keys: keys.into_iter().map(Into::into).collect(),
        };
        let packet = RpcPacket::new(NodeName::from(sender), op.clone());
        let decoded = RpcPacket::deserialize(&packet.serialize().unwrap()).unwrap();
        prop_assert_eq!(decoded.sender, packet.sender);
        prop_assert_eq!(decoded.op, op);
    }
}
