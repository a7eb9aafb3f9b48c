//! Cluster-set input: a JSON array of clusters, each an array of members
//! (`{"read": <index>, "rev": <bool>}`), as produced by the upstream
//! clustering stage.

use crate::correct::Cluster;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

pub fn read_clusters(path: &Path) -> io::Result<Vec<Cluster>> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
