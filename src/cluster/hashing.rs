/// Hashes a request key into the 128-bit key space (`H`).
///
/// MD5 is used for its uniform spread, not for security. The result depends
/// only on the input bytes, so ring state is reproducible across restarts.
pub fn key_hash(key: &str) -> u128 {
    digest_u128(key.as_bytes())
}

/// Hashes the `replica_index`-th virtual node of a server (`PHI`).
pub fn vnode_hash(server_id: ServerId, replica_index: u32) -> u128 {
    digest_u128(format!("{}-{}", server_id, replica_index).as_bytes())
}

fn digest_u128(bytes: &[u8]) -> u128 {
    let digest = Md5::digest(bytes);
    let mut raw = [0u8; 16];
    raw.copy_from_slice(&digest);
    u128::from_be_bytes(raw)
}
