pub mod json_extract;
pub mod logging;

pub use json_extract::{extract_json, strip_code_fence, ExtractError, Validate};
pub use logging::truncate_text;
