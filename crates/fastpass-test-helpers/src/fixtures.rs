//! Test fixtures - source snippets and compiled artifacts

/// A small TypeScript test file
pub fn spec_source() -> &'static str {
    r#"import { add } from './math';

test('adds', () => {
  expect(add(1, 2)).toBe(3);
});
"#
}

/// A helper module imported by [`spec_source`]
pub fn math_source() -> &'static str {
    "export function add(a: number, b: number): number {\n  return a + b;\n}\n"
}

/// Source map document for a single source file
pub fn source_map_for(source_name: &str) -> String {
    format!(
        r#"{{"version":3,"sources":["{source_name}"],"names":[],"mappings":"AAAA,SAAS"}}"#
    )
}

/// Compiled output the fake transformer produces for `source`
pub fn transpile(source: &str) -> String {
    format!("\"use strict\";\n// compiled\n{source}")
}
