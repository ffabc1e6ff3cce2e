//! Outbound header sets.
//!
//! `real_simulation` mirrors the header list the Kiro IDE's AWS SDK sends, in
//! the same order. User agent and machine id are derived from the credential
//! id, so one credential always presents as the same IDE install.

use sha2::{Digest, Sha256};

use kiro_types::models::HeaderStrategy;

pub const KIRO_VERSION: &str = "0.1.25";
const AWS_SDK_VERSION: &str = "1.0.7";
const NODE_VERSION: &str = "20.16.0";

/// FNV-1a hash constant (stable across Rust versions, unlike DefaultHasher).
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Platforms the reference IDE ships for.
const OS_POOL: &[&str] = &["darwin#24.1.0", "darwin#23.6.0", "win32#10.0.22631", "linux#6.8.0-45-generic"];

fn fnv1a_hash(data: &str) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in data.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Stable 64-hex machine id for a credential.
pub fn machine_id(credential_id: &str) -> String {
    let digest = Sha256::digest(format!("kiro-machine:{}", credential_id).as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn os_for(credential_id: &str) -> &'static str {
    OS_POOL[(fnv1a_hash(credential_id) as usize) % OS_POOL.len()]
}

pub fn user_agent(credential_id: &str) -> String {
    format!(
        "aws-sdk-js/{sdk} ua/2.1 os/{os} lang/js md/nodejs#{node} api/codewhispererstreaming#{sdk} m/E KiroIDE-{kiro}-{machine}",
        sdk = AWS_SDK_VERSION,
        os = os_for(credential_id),
        node = NODE_VERSION,
        kiro = KIRO_VERSION,
        machine = machine_id(credential_id),
    )
}

pub fn amz_user_agent(credential_id: &str) -> String {
    format!("aws-sdk-js/{} KiroIDE-{}-{}", AWS_SDK_VERSION, KIRO_VERSION, machine_id(credential_id))
}

/// Ordered `(name, value)` pairs for one call.
///
/// Names are lowercase here; HTTP/1 clients title-case them on the wire.
pub fn build_headers(strategy: HeaderStrategy, credential_id: &str, secret: &str) -> Vec<(&'static str, String)> {
    let authorization = format!("Bearer {}", secret);
    match strategy {
        HeaderStrategy::Off => vec![
            ("content-type", "application/json".to_string()),
            ("accept", "application/vnd.amazon.eventstream".to_string()),
            ("authorization", authorization),
        ],
        HeaderStrategy::RealSimulation => vec![
            ("content-type", "application/json".to_string()),
            ("x-amzn-codewhisperer-optout", "true".to_string()),
            ("x-amzn-kiro-agent-mode", "vibe".to_string()),
            ("x-amz-user-agent", amz_user_agent(credential_id)),
            ("user-agent", user_agent(credential_id)),
            ("amz-sdk-invocation-id", uuid::Uuid::new_v4().to_string()),
            ("amz-sdk-request", "attempt=1; max=1".to_string()),
            ("authorization", authorization),
            ("accept", "application/vnd.amazon.eventstream".to_string()),
        ],
    }
}
