// Version information for the fundus classifier service

/// Semantic version number
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name, used in startup logs
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "vit-classifier",
    "multipart-upload",
    "pth-weights",
    "safetensors-weights",
];

pub fn get_version_string() -> String {
    format!("{} v{}", NAME, VERSION)
}
