//! Source Map v3 emission.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub sources: Vec<String>,
    pub sources_content: Vec<String>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// `data:` URL form, suitable for a `sourceMappingURL` comment.
    pub fn to_url(&self) -> String {
        format!("data:application/json;charset=utf-8;base64,{}", STANDARD.encode(self.to_json()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    generated_column: u32,
    original_line: u32,
    original_column: u32,
}

/// Collects mapping points line by line.
#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    lines: Vec<Vec<Segment>>,
}

impl SourceMapBuilder {
    pub fn new() -> Self {
        SourceMapBuilder::default()
    }

    /// Maps a generated position to an original one. All values are zero-based.
    pub fn add(&mut self, generated_line: u32, generated_column: u32, original_line: u32, original_column: u32) {
        let line = generated_line as usize;
        if self.lines.len() <= line {
            self.lines.resize_with(line + 1, Vec::new);
        }
        let segments = &mut self.lines[line];
        let segment = Segment {
            generated_column,
            original_line,
            original_column,
        };
        if segments.last() != Some(&segment) {
            segments.push(segment);
        }
    }

    pub fn mappings(&self) -> String {
        let mut out = String::new();
        let mut previous_line = 0i64;
        let mut previous_column = 0i64;
        for (i, segments) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            let mut previous_generated = 0i64;
            for (j, segment) in segments.iter().enumerate() {
                if j > 0 {
                    out.push(',');
                }
                encode_vlq(&mut out, segment.generated_column as i64 - previous_generated);
                // single source
                encode_vlq(&mut out, 0);
                encode_vlq(&mut out, segment.original_line as i64 - previous_line);
                encode_vlq(&mut out, segment.original_column as i64 - previous_column);
                previous_generated = segment.generated_column as i64;
                previous_line = segment.original_line as i64;
                previous_column = segment.original_column as i64;
            }
        }
        out
    }

    pub fn build(&self, source: &str, content: &str, file: Option<&str>) -> SourceMap {
        SourceMap {
            version: 3,
            file: file.map(str::to_string),
            sources: vec![source.to_string()],
            sources_content: vec![content.to_string()],
            names: Vec::new(),
            mappings: self.mappings(),
        }
    }
}

fn encode_vlq(out: &mut String, value: i64) {
    let mut vlq = if value < 0 { ((-value) << 1) | 1 } else { value << 1 };
    loop {
        let mut digit = (vlq & 0b11111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b100000;
        }
        out.push(BASE64[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vlq() {
        let mut out = String::new();
        for value in [0, 1, -1, 15, 16, -16, 1000] {
            encode_vlq(&mut out, value);
            out.push(' ');
        }
        assert_eq!(out, "A C D e gB hB w+B ");
    }

    #[test]
    fn test_mappings_are_relative() {
        let mut builder = SourceMapBuilder::new();
        builder.add(0, 0, 0, 0);
        builder.add(0, 5, 0, 10);
        builder.add(2, 1, 1, 0);
        assert_eq!(builder.mappings(), "AAAA,KAAU;;CACV");
    }

    #[test]
    fn test_build_json() {
        let mut builder = SourceMapBuilder::new();
        builder.add(0, 0, 0, 0);
        let map = builder.build("page.html", "<p></p>", None);
        let json: serde_json::Value = serde_json::from_str(&map.to_json()).unwrap();
        assert_eq!(json["version"], 3);
        assert_eq!(json["sources"][0], "page.html");
        assert_eq!(json["sourcesContent"][0], "<p></p>");
        assert_eq!(json["mappings"], "AAAA");
    }

    #[test]
    fn test_data_url_round_trips() {
        let mut builder = SourceMapBuilder::new();
        builder.add(0, 0, 0, 0);
        let map = builder.build("päge.html", "<p>日本</p>", Some("out.html"));
        let url = map.to_url();
        let encoded = url.strip_prefix("data:application/json;charset=utf-8;base64,").unwrap();
        assert!(encoded.len() % 4 == 0);
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), map.to_json());
    }
}
