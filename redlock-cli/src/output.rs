use serde::Serialize;

use redlock_core::Lock;

// ─── Envelope ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }

    /// Writes the envelope as one JSON line on stdout.
    pub fn print(&self) {
        match serde_json::to_string(self) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!("Failed to serialize response: {}", e),
        }
    }
}

// ─── Payloads ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct LockInfo {
    pub event: &'static str,
    pub resources: Vec<String>,
    pub token: String,
    pub validity_ms: u64,
}

impl LockInfo {
    pub fn new(event: &'static str, lock: &Lock) -> Self {
        Self {
            event,
            resources: lock.resources().to_vec(),
            token: lock.token().to_string(),
            validity_ms: lock.validity().as_millis() as u64,
        }
    }
}

#[derive(Serialize)]
pub struct ReleaseInfo {
    pub event: &'static str,
    pub resources: Vec<String>,
    pub held_ms: u64,
}

#[derive(Serialize)]
pub struct DemoStep {
    pub caller: &'static str,
    pub action: &'static str,
    pub outcome: String,
    pub expected: bool,
}

#[derive(Serialize)]
pub struct ConfigInfo<'a> {
    pub storage: &'a str,
    pub quorum: usize,
    pub config: &'a redlock_core::RedlockConfig,
}
