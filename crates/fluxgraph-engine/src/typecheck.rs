//! Port type compatibility checker (§4.1).
//!
//! A pure function over two raw type tags — not a closed enum — because the
//! rule table explicitly falls through to `incompatible` for tags it has
//! never seen, and a flow file is free to declare a port type this engine
//! does not recognize as a built-in. Checking stays a string operation all
//! the way down; there is no intermediate `PortType` to keep in sync with
//! whatever tags a node author invents.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compatibility {
    Exact,
    Compatible,
    Coercible,
    Incompatible,
}

fn normalize(tag: &str) -> String {
    let trimmed = tag.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        "any".to_string()
    } else {
        trimmed
    }
}

/// The fixed hierarchy from rule 3: a source tag is compatible with any
/// target named in its row (plus `any`, always compatible as target by
/// rule 2).
fn hierarchy(source: &str) -> &'static [&'static str] {
    match source {
        "number" => &["number"],
        "string" => &["string"],
        "boolean" => &["boolean"],
        "array" => &["array"],
        "object" => &["object"],
        "schematic" => &["schematic"],
        "vec2" => &["vec2", "vector", "object"],
        "vec3" => &["vec3", "vector", "object"],
        "vector" => &["vector", "object"],
        _ => &[],
    }
}

/// The coercion table from rule 4: unordered pairs that coerce into each
/// other.
fn coerces(a: &str, b: &str) -> bool {
    let pairs: [(&str, &str); 4] = [
        ("number", "string"),
        ("number", "boolean"),
        ("string", "boolean"),
        ("array", "object"),
    ];
    pairs
        .iter()
        .any(|&(x, y)| (a == x && b == y) || (a == y && b == x))
}

/// Checks whether a value produced on a `source`-typed port can flow into a
/// `target`-typed port. Pure and deterministic: used for edit-time
/// feedback and pre-flight validation, never enforced at execution time
/// (execution trusts edges, per the contract).
pub fn check(source: &str, target: &str) -> Compatibility {
    let source = normalize(source);
    let target = normalize(target);

    if source == target {
        return Compatibility::Exact;
    }
    if target == "any" {
        return Compatibility::Compatible;
    }
    if hierarchy(&source).contains(&target.as_str()) {
        return Compatibility::Compatible;
    }
    if coerces(&source, &target) {
        return Compatibility::Coercible;
    }
    if source.contains("vec") && target.contains("vec") {
        return Compatibility::Coercible;
    }
    Compatibility::Incompatible
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_case_and_whitespace_insensitive() {
        assert_eq!(check("Number", " number "), Compatibility::Exact);
    }

    #[test]
    fn missing_tags_normalize_to_any_and_match() {
        assert_eq!(check("", ""), Compatibility::Exact);
    }

    #[test]
    fn any_target_is_always_compatible() {
        assert_eq!(check("string", "any"), Compatibility::Compatible);
        assert_eq!(check("vec3", "any"), Compatibility::Compatible);
    }

    #[test]
    fn hierarchy_promotes_vec_to_vector_and_object() {
        assert_eq!(check("vec2", "vector"), Compatibility::Compatible);
        assert_eq!(check("vec3", "object"), Compatibility::Compatible);
        assert_eq!(check("vector", "object"), Compatibility::Compatible);
    }

    #[test]
    fn hierarchy_does_not_cross_vec2_and_vec3() {
        assert_eq!(check("vec2", "vec3"), Compatibility::Coercible);
    }

    #[test]
    fn coercion_table_pairs_are_symmetric() {
        assert_eq!(check("number", "string"), Compatibility::Coercible);
        assert_eq!(check("string", "number"), Compatibility::Coercible);
        assert_eq!(check("boolean", "string"), Compatibility::Coercible);
        assert_eq!(check("array", "object"), Compatibility::Coercible);
        assert_eq!(check("object", "array"), Compatibility::Incompatible);
    }

    #[test]
    fn unknown_vec_like_tags_fall_back_to_substring_rule() {
        assert_eq!(check("vec4", "vec2"), Compatibility::Coercible);
    }

    #[test]
    fn unrelated_tags_are_incompatible() {
        assert_eq!(check("string", "schematic"), Compatibility::Incompatible);
    }
}
