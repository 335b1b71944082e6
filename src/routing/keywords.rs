//! Canonical keyword-classification tables.
//!
//! One table, one version. Earlier incarnations of this feature kept slightly
//! different copies of these lists in several places; any future change must
//! happen here and bump [`TABLE_VERSION`].

pub const TABLE_VERSION: u32 = 1;

/// Image intent, checked before everything else. Note "generate" and "create"
/// appear here and in [`CODE_GENERATE`]; image priority means they only reach
/// the code branch when no image keyword matched first.
pub const IMAGE: &[&str] = &[
    "image",
    "picture",
    "photo",
    "generate",
    "create",
    "draw",
    "visual",
    "art",
    "design",
    "logo",
    "illustration",
];

/// Sub-class of image intent selecting the creative-art model.
pub const ARTISTIC: &[&str] = &["artistic", "creative", "painting", "drawing"];

/// Code intent, checked only when no image keyword matched.
pub const CODE: &[&str] = &[
    "code",
    "program",
    "function",
    "algorithm",
    "bug",
    "debug",
    "error",
    "syntax",
    "compile",
    "variable",
    "class",
    "sql",
    "query",
];

pub const CODE_EXPLAIN: &[&str] = &["explain", "why", "how", "complex"];

pub const CODE_GENERATE: &[&str] = &["generate", "write", "create", "complete"];

pub const CODE_OPTIMIZE: &[&str] = &["optimize", "improve", "analyze", "review"];

/// Substring membership over an already lower-cased message.
pub fn matches_any(text: &str, class: &[&str]) -> bool {
    class.iter().any(|keyword| text.contains(keyword))
}
