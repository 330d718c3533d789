// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use config::ServerConfig;
use refseq::{MaskSet, Reference};
use snvnet_rs::Server;
use storage::{MemoryStore, PersistencePort};

pub const TEST_REFERENCE: &str = "AAAAAAAAAA";

/// A configuration matching the seed scenarios: ceiling 3, strict
/// uncertainty cutoff, one single-linkage algorithm per threshold 1 and 2.
pub fn test_config() -> ServerConfig {
    let yaml = "\
server_name: snvnet-test
description: integration fixture
reference_fasta: /dev/null
snv_ceiling: 3
max_n_percent: 0.3
mixture_alpha: 0.00001
working_set_capacity: 16
debug_mode: true
clustering:
  - name: snp1
    threshold: 1
    uncertain_char: N
    mixture_policy: include_mixed
  - name: snp2
    threshold: 2
    uncertain_char: N
    mixture_policy: exclude_mixed_from_growth
";
    serde_yaml::from_str(yaml).expect("fixture config parses")
}

pub fn test_server() -> Server {
    test_server_on(Arc::new(MemoryStore::new()))
}

pub fn test_server_on(port: Arc<dyn PersistencePort>) -> Server {
    test_server_with(test_config(), port)
}

pub fn test_server_with(config: ServerConfig, port: Arc<dyn PersistencePort>) -> Server {
    let reference = Reference::new(TEST_REFERENCE).expect("fixture reference");
    let mask = MaskSet::empty(reference.len());
    Server::assemble(config, reference, mask, port).expect("fixture server assembles")
}
