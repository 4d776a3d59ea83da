pub mod out;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INVALID_REQUEST: u8 = 2;
pub const EXIT_MISSING_PLAN: u8 = 3;
pub const EXIT_ENGINE_ERROR: u8 = 4;
pub const EXIT_BACKEND_ERROR: u8 = 5;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}
