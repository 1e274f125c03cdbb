use crate::core::{Liveness, Replica, Result, RouterError, ServerId, WorkerHandle};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound::{Excluded, Unbounded};
use tracing::{debug, error};

// Ring and replica bookkeeping are split by concern; they share one namespace.
include!("cluster/hashing.rs");
include!("cluster/ring.rs");
include!("cluster/registry.rs");
include!("cluster/state.rs");

#[cfg(test)]
mod tests;
