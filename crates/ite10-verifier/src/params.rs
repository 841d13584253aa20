//! Parameter substitution into layout templates.
//!
//! A layout may carry `{KEY}` placeholders in its rules, commands, subject
//! patterns, and predicate types. Substitution happens once, before
//! verification; placeholders without a value are left as written.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::VerificationError;
use crate::layout::Layout;

/// Load a flat string-to-string parameter map from a JSON file.
pub fn load(path: &Path) -> Result<BTreeMap<String, String>, VerificationError> {
    let data = std::fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(VerificationError::from)
}

/// Return a copy of `layout` with every `{KEY}` replaced by `params[KEY]`.
#[must_use]
pub fn substitute(layout: &Layout, params: &BTreeMap<String, String>) -> Layout {
    let mut out = layout.clone();
    if params.is_empty() {
        return out;
    }

    let fill = |values: &mut Vec<String>| {
        for v in values.iter_mut() {
            *v = substitute_str(v, params);
        }
    };

    for step in &mut out.steps {
        step.command = substitute_str(&step.command, params);
        for block in &mut step.expected_predicates {
            fill(&mut block.predicate_types);
            fill(&mut block.expected_materials);
            fill(&mut block.expected_products);
            fill(&mut block.expected_attributes);
        }
    }
    for subject in &mut out.subjects {
        fill(&mut subject.subject);
        for block in &mut subject.expected_predicates {
            fill(&mut block.predicate_types);
            fill(&mut block.expected_attributes);
        }
    }
    for inspection in &mut out.inspections {
        inspection.command = substitute_str(&inspection.command, params);
        fill(&mut inspection.predicates);
        fill(&mut inspection.expected_materials);
        fill(&mut inspection.expected_products);
        fill(&mut inspection.expected_attributes);
    }
    out
}

/// Replace `{KEY}` placeholders in a single string.
pub fn substitute_str(template: &str, params: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match params.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn replaces_known_keys() {
        let p = params(&[("COMPILER", "gcc"), ("VERSION", "1.2")]);
        assert_eq!(
            substitute_str("command is {COMPILER}-{VERSION}", &p),
            "command is gcc-1.2"
        );
    }

    #[test]
    fn unknown_and_unterminated_placeholders_stay() {
        let p = params(&[("A", "x")]);
        assert_eq!(substitute_str("{B} {A} {C", &p), "{B} x {C");
    }

    #[test]
    fn substitutes_throughout_layout() {
        let layout = Layout::from_slice(
            br#"
expires: "2030-01-01T00:00:00Z"
steps:
  - name: build
    command: "{CC} main.c"
    expectedPredicates:
      - predicateTypes: ["{LINK}"]
        expectedAttributes: ["command is {CC}"]
subjects:
  - subject: ["{ARTIFACT}"]
inspections:
  - name: check
    command: "test -f {ARTIFACT}"
"#,
        )
        .unwrap();
        let p = params(&[
            ("CC", "gcc"),
            ("LINK", "https://in-toto.io/attestation/link/v0.3"),
            ("ARTIFACT", "app"),
        ]);
        let out = substitute(&layout, &p);
        assert_eq!(out.steps[0].command, "gcc main.c");
        let block = &out.steps[0].expected_predicates[0];
        assert_eq!(block.predicate_types[0], "https://in-toto.io/attestation/link/v0.3");
        assert_eq!(block.expected_attributes[0], "command is gcc");
        assert_eq!(out.subjects[0].subject[0], "app");
        assert_eq!(out.inspections[0].command, "test -f app");
        // The input is untouched.
        assert_eq!(layout.steps[0].command, "{CC} main.c");
    }

    #[test]
    fn load_reads_json_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{"CC": "gcc"}"#).unwrap();
        assert_eq!(load(&path).unwrap()["CC"], "gcc");
    }
}
