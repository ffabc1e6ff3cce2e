//! Secret masking for logs and status views.

const MASK: &str = "********";
const VISIBLE_SUFFIX: usize = 4;
const MIN_LEN_FOR_SUFFIX: usize = 8;

/// Fixed-length mask that reveals only the last few characters.
///
/// Secrets shorter than eight characters are masked completely.
pub fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    if len < MIN_LEN_FOR_SUFFIX {
        return MASK.to_string();
    }
    let suffix: String = secret.chars().skip(len - VISIBLE_SUFFIX).collect();
    format!("{MASK}{suffix}")
}
