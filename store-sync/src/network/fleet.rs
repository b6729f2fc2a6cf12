//! Store nodes shipped with each fleet.

use crate::types::StoreNode;

/// `(id, address, fleet, version)` rows.
const DEFAULT_STORE_NODES: &[(&str, &str, &str, u32)] = &[
    ("mail-01.ac-cn-hongkong-c.eth.prod", "enode://606ae04a71e5db868a722c77a21c8244ae38f1bd6e81687cc6cfe88a3063fa1c245692232f64f45bd5408fed5133eab8ed78049332b04f9c110eac7f71c1b429@47.75.247.214:443", "eth.prod", 1),
    ("mail-01.do-ams3.eth.prod", "enode://c42f368a23fa98ee546fd247220759062323249ef657d26d357a777443aec04db1b29a3a22ef3e7c548e18493ddaf51a31b0aed6079bd6ebe5ae838fcfaf3a49@178.128.142.54:443", "eth.prod", 1),
    ("mail-01.gc-us-central1-a.eth.prod", "enode://ee2b53b0ace9692167a410514bca3024695dbf0e1a68e1dff9716da620efb195f04a4b9e873fb9b74ac84de801106c465b8e2b6c4f0d93b8749d1578bfcaf03e@104.197.238.144:443", "eth.prod", 1),
    ("mail-01.ac-cn-hongkong-c.eth.test", "enode://619dbb5dda12e85bf0eb5db40fb3de625609043242737c0e975f7dfd659d85dc6d9a84f9461a728c5ab68c072fed38ca6a53917ca24b8e93cc27bdef3a1e79ac@47.52.188.196:443", "eth.test", 1),
    ("mail-01.do-ams3.eth.test", "enode://e4865fe6c2a9c1a563a6447990d8e9ce672644ae3e08277ce38ec1f1b690eef6320c07a5d60c3b629f5d4494f93d6b86a745a0bf64ab295bbf6579017adc6ed8@206.189.243.161:443", "eth.test", 1),
    ("mail-01.gc-us-central1-a.eth.test", "enode://707e57453acd3e488c44b9d0e17975371e2f8fb67525eae5baca9b9c8e06c86cde7c794a6c2e36203bf9f56cae8b0e50f3b33c4c2b694a7baeea1754464ce4e3@35.192.229.172:443", "eth.test", 1),
    ("node-01.ac-cn-hongkong-c.wakuv2.prod", "/ip4/8.210.222.231/tcp/30303/p2p/16Uiu2HAm4v86W3bmT1BiH6oSPzcsSr24iDQpSN5Qa992BCjjwgrD", "wakuv2.prod", 2),
    ("node-01.do-ams3.wakuv2.prod", "/ip4/188.166.135.145/tcp/30303/p2p/16Uiu2HAmL5okWopX7NqZWBUKVqW8iUxCEmd5GMHLVPwCgzYzQv3e", "wakuv2.prod", 2),
    ("node-01.gc-us-central1-a.wakuv2.prod", "/ip4/34.121.100.108/tcp/30303/p2p/16Uiu2HAmVkKntsECaYfefR1V2yCR79CegLATuTPE6B9TxgxBiiiA", "wakuv2.prod", 2),
    ("node-01.ac-cn-hongkong-c.wakuv2.test", "/ip4/47.242.210.73/tcp/30303/p2p/16Uiu2HAkvWiyFsgRhuJEb9JfjYxEkoHLgnUQmr1N5mKWnYjxYRVm", "wakuv2.test", 2),
    ("node-01.do-ams3.wakuv2.test", "/ip4/134.209.139.210/tcp/30303/p2p/16Uiu2HAmPLe7Mzm8TsYUubgCAW1aJoeFScxrLj8ppHFivPo97bUZ", "wakuv2.test", 2),
    ("node-01.gc-us-central1-a.wakuv2.test", "/ip4/104.154.239.128/tcp/30303/p2p/16Uiu2HAmJb2e28qLXxT5kZxVUUoJt72EMzNGXB47Rxx5hw3q4YjS", "wakuv2.test", 2),
    ("node-01.ac-cn-hongkong-c.status.prod", "/dns4/node-01.ac-cn-hongkong-c.status.prod.statusim.net/tcp/30303/p2p/16Uiu2HAkvEZgh3KLwhLwXg95e5ojM8XykJ4Kxi2T7hk22rnA7pJC", "status.prod", 2),
    ("node-01.do-ams3.status.prod", "/dns4/node-01.do-ams3.status.prod.statusim.net/tcp/30303/p2p/16Uiu2HAm6HZZr7aToTvEBPpiys4UxajCTU97zj5v7RNR2gbniy1D", "status.prod", 2),
    ("node-01.gc-us-central1-a.status.prod", "/dns4/node-01.gc-us-central1-a.status.prod.statusim.net/tcp/30303/p2p/16Uiu2HAkwBp8T6G77kQXSNMnxgaMky1JeyML5yqoTHRM8dbeCBNb", "status.prod", 2),
    ("node-02.ac-cn-hongkong-c.status.prod", "/dns4/node-02.ac-cn-hongkong-c.status.prod.statusim.net/tcp/30303/p2p/16Uiu2HAmFy8BrJhCEmCYrUfBdSNkrPw6VHExtv4rRp1DSBnCPgx8", "status.prod", 2),
    ("node-02.do-ams3.status.prod", "/dns4/node-02.do-ams3.status.prod.statusim.net/tcp/30303/p2p/16Uiu2HAmSve7tR5YZugpskMv2dmJAsMUKmfWYEKRXNUxRaTCnsXV", "status.prod", 2),
    ("node-02.gc-us-central1-a.status.prod", "/dns4/node-02.gc-us-central1-a.status.prod.statusim.net/tcp/30303/p2p/16Uiu2HAmDQugwDHM3YeUp86iGjrUvbdw3JPRgikC7YoGBsT2ymMg", "status.prod", 2),
    ("node-01.ac-cn-hongkong-c.status.test", "/dns4/node-01.ac-cn-hongkong-c.status.test.statusim.net/tcp/30303/p2p/16Uiu2HAm2BjXxCp1sYFJQKpLLbPbwd5juxbsYofu3TsS3auvT9Yi", "status.test", 2),
    ("node-01.do-ams3.status.test", "/dns4/node-01.do-ams3.status.test.statusim.net/tcp/30303/p2p/16Uiu2HAkukebeXjTQ9QDBeNDWuGfbaSg79wkkhK4vPocLgR6QFDf", "status.test", 2),
    ("node-01.gc-us-central1-a.status.test", "/dns4/node-01.gc-us-central1-a.status.test.statusim.net/tcp/30303/p2p/16Uiu2HAmGDX3iAFox93PupVYaHa88kULGqMpJ7AEHGwj3jbMtt76", "status.test", 2),
    ("store-01.do-ams3.shards.test", "/dns4/store-01.do-ams3.shards.test.statusim.net/tcp/30303/p2p/16Uiu2HAmAUdrQ3uwzuE4Gy4D56hX6uLKEeerJAnhKEHZ3DxF1EfT", "shards.test", 2),
    ("store-02.do-ams3.shards.test", "/dns4/store-02.do-ams3.shards.test.statusim.net/tcp/30303/p2p/16Uiu2HAm9aDJPkhGxc2SFcEACTFdZ91Q5TJjp76qZEhq9iF59x7R", "shards.test", 2),
    ("store-01.gc-us-central1-a.shards.test", "/dns4/store-01.gc-us-central1-a.shards.test.statusim.net/tcp/30303/p2p/16Uiu2HAmMELCo218hncCtTvC2Dwbej3rbyHQcR8erXNnKGei7WPZ", "shards.test", 2),
    ("store-02.gc-us-central1-a.shards.test", "/dns4/store-02.gc-us-central1-a.shards.test.statusim.net/tcp/30303/p2p/16Uiu2HAmJnVR7ZzFaYvciPVafUXuYGLHPzSUigqAmeNw9nJUVGeM", "shards.test", 2),
    ("store-01.ac-cn-hongkong-c.shards.test", "/dns4/store-01.ac-cn-hongkong-c.shards.test.statusim.net/tcp/30303/p2p/16Uiu2HAm2M7xs7cLPc3jamawkEqbr7cUJX11uvY7LxQ6WFUdUKUT", "shards.test", 2),
    ("store-02.ac-cn-hongkong-c.shards.test", "/dns4/store-02.ac-cn-hongkong-c.shards.test.statusim.net/tcp/30303/p2p/16Uiu2HAm9CQhsuwPR54q27kNj9iaQVfyRzTGKrhFmr94oD8ujU6P", "shards.test", 2),
];

/// Every default store node across all fleets.
pub fn all_default_store_nodes() -> Vec<StoreNode> {
    DEFAULT_STORE_NODES
        .iter()
        .map(|(id, address, fleet, version)| StoreNode::new(*id, *address, *fleet, *version))
        .collect()
}

/// Default store nodes for `fleet`. Unknown fleets have none.
pub fn default_store_nodes(fleet: &str) -> Vec<StoreNode> {
    all_default_store_nodes().into_iter().filter(|node| node.fleet == fleet).collect()
}

/// Fleets that have at least one default store node.
pub fn known_fleets() -> Vec<&'static str> {
    let mut fleets: Vec<&'static str> = DEFAULT_STORE_NODES.iter().map(|row| row.2).collect();
    fleets.dedup();
    fleets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fleet_lookup() {
        let nodes = default_store_nodes("status.prod");
        assert_eq!(nodes.len(), 6);
        assert!(nodes.iter().all(|n| n.version == 2 && !n.custom));
        assert!(nodes.iter().any(|n| n.id == "node-01.do-ams3.status.prod"));
    }

    #[test]
    fn test_unknown_fleet_is_empty() {
        assert!(default_store_nodes("no.such.fleet").is_empty());
    }

    #[test]
    fn test_legacy_fleet_uses_enodes() {
        let nodes = default_store_nodes("eth.prod");
        assert!(!nodes.is_empty());
        assert!(nodes.iter().all(|n| n.version == 1 && n.address.starts_with("enode://")));
    }

    #[test]
    fn test_ids_are_unique() {
        let mut ids: Vec<_> = all_default_store_nodes().into_iter().map(|n| n.id).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert!(known_fleets().contains(&"shards.test"));
    }
}
