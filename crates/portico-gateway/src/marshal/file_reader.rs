//! Turns an uploaded file into JSON by file type.
//!
//! - `.xlsx`: the first worksheet; the first row names the columns and every
//!   later row with exactly as many cells becomes an object.
//! - `.jpg`, `.jpeg`, `.png`: a one-element array holding the base64 bytes.
//! - anything else: the base64 bytes as a single string.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::error::MarshalError;
use crate::message::encode_base64;

/// Reads `path`, uploaded as `filename`, into `{"filename": ..., "data": ...}`.
pub fn read_file(path: &Path, filename: &str) -> Result<Value, MarshalError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let data = match extension.as_str() {
        "xlsx" => {
            let rows = read_first_sheet(path)?;
            Value::Array(rows_to_objects(rows).into_iter().map(Value::Object).collect())
        }
        "jpg" | "jpeg" | "png" => json!([encode_base64(&std::fs::read(path)?)]),
        _ => Value::String(encode_base64(&std::fs::read(path)?)),
    };

    Ok(json!({ "filename": filename, "data": data }))
}

fn rows_to_objects(rows: Vec<Vec<String>>) -> Vec<serde_json::Map<String, Value>> {
    let mut rows = rows.into_iter();
    let Some(columns) = rows.next() else {
        return Vec::new();
    };

    rows.filter(|row| row.len() == columns.len())
        .map(|row| {
            columns
                .iter()
                .cloned()
                .zip(row.into_iter().map(Value::String))
                .collect()
        })
        .collect()
}

fn spreadsheet_error(error: impl ToString) -> MarshalError {
    MarshalError::UnsupportedSpreadsheet(error.to_string())
}

fn read_entry(archive: &mut zip::ZipArchive<File>, name: &str) -> Result<Option<String>, MarshalError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(error) => return Err(spreadsheet_error(error)),
    };
    let mut content = String::new();
    entry.read_to_string(&mut content).map_err(spreadsheet_error)?;
    Ok(Some(content))
}

fn read_first_sheet(path: &Path) -> Result<Vec<Vec<String>>, MarshalError> {
    let mut archive = zip::ZipArchive::new(File::open(path)?).map_err(spreadsheet_error)?;

    let sheet_path = first_sheet_path(&mut archive)?;
    let sheet = read_entry(&mut archive, &sheet_path)?
        .ok_or_else(|| spreadsheet_error(format!("missing {sheet_path}")))?;
    let shared = read_entry(&mut archive, "xl/sharedStrings.xml")?
        .map(|xml| shared_strings(&xml))
        .unwrap_or_default();

    Ok(sheet_rows(&sheet, &shared))
}

fn first_sheet_path(archive: &mut zip::ZipArchive<File>) -> Result<String, MarshalError> {
    const FALLBACK: &str = "xl/worksheets/sheet1.xml";

    let Some(workbook) = read_entry(archive, "xl/workbook.xml")? else {
        return Ok(FALLBACK.to_string());
    };
    let Some(rel_id) = patterns()
        .sheet
        .captures(&workbook)
        .and_then(|caps| attribute(&caps[0], "r:id"))
    else {
        return Ok(FALLBACK.to_string());
    };
    let Some(rels) = read_entry(archive, "xl/_rels/workbook.xml.rels")? else {
        return Ok(FALLBACK.to_string());
    };

    let target = patterns()
        .relationship
        .find_iter(&rels)
        .map(|m| m.as_str())
        .find(|tag| attribute(tag, "Id").as_deref() == Some(rel_id.as_str()))
        .and_then(|tag| attribute(tag, "Target"));

    Ok(match target {
        Some(target) if target.starts_with('/') => target.trim_start_matches('/').to_string(),
        Some(target) => format!("xl/{target}"),
        None => FALLBACK.to_string(),
    })
}

struct Patterns {
    sheet: Regex,
    relationship: Regex,
    shared_item: Regex,
    text: Regex,
    row: Regex,
    cell: Regex,
    value: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |pattern: &str| Regex::new(pattern).expect("static pattern compiles");
        Patterns {
            sheet: compile(r"<sheet\b[^>]*>"),
            relationship: compile(r"<Relationship\b[^>]*>"),
            shared_item: compile(r"(?s)<si\b[^>]*?(?:/>|>(.*?)</si>)"),
            text: compile(r"(?s)<t(?:\s[^>]*)?>(.*?)</t>"),
            row: compile(r"(?s)<row\b([^>]*?)(?:/>|>(.*?)</row>)"),
            cell: compile(r"(?s)<c\b([^>]*?)(?:/>|>(.*?)</c>)"),
            value: compile(r"(?s)<v>(.*?)</v>"),
        }
    })
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    let needle = format!("{name}=\"");
    let start = tag
        .match_indices(&needle)
        .find(|(index, _)| *index == 0 || tag.as_bytes()[index - 1].is_ascii_whitespace())
        .map(|(index, _)| index + needle.len())?;
    let end = tag[start..].find('"')? + start;
    Some(unescape(&tag[start..end]))
}

/// Decodes the predefined XML entities and numeric character references.
/// Anything else after `&` is kept as written.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail
            .find(';')
            .and_then(|end| entity(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let reference = name.strip_prefix('#')?;
            let code = match reference.strip_prefix('x').or_else(|| reference.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => reference.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

fn joined_text(xml: &str) -> String {
    patterns()
        .text
        .captures_iter(xml)
        .map(|caps| unescape(&caps[1]))
        .collect()
}

fn shared_strings(xml: &str) -> Vec<String> {
    patterns()
        .shared_item
        .captures_iter(xml)
        .map(|caps| caps.get(1).map_or_else(String::new, |inner| joined_text(inner.as_str())))
        .collect()
}

/// Zero-based column of a reference such as `AB12`.
fn column_index(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return None;
    }
    letters
        .iter()
        .try_fold(0usize, |acc, letter| {
            acc.checked_mul(26)?.checked_add(usize::from(letter - b'A') + 1)
        })
        .map(|n| n - 1)
}

fn cell_value(attrs: &str, inner: &str, shared: &[String]) -> String {
    let raw = patterns()
        .value
        .captures(inner)
        .map(|caps| unescape(&caps[1]))
        .unwrap_or_default();

    match attribute(attrs, "t").as_deref() {
        Some("s") => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|index| shared.get(index).cloned())
            .unwrap_or_default(),
        Some("inlineStr") => joined_text(inner),
        Some("b") => match raw.trim() {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            other => other.to_string(),
        },
        _ => raw,
    }
}

/// Rows of a worksheet, gaps filled with empty rows and cells, trailing
/// empty cells removed.
fn sheet_rows(xml: &str, shared: &[String]) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();

    for row in patterns().row.captures_iter(xml) {
        if let Some(number) = attribute(&row[1], "r").and_then(|r| r.parse::<usize>().ok()) {
            while rows.len() + 1 < number {
                rows.push(Vec::new());
            }
        }

        let mut cells: Vec<String> = Vec::new();
        let body = row.get(2).map_or("", |m| m.as_str());
        for cell in patterns().cell.captures_iter(body) {
            let attrs = &cell[1];
            let inner = cell.get(2).map_or("", |m| m.as_str());
            let column = attribute(attrs, "r")
                .and_then(|r| column_index(&r))
                .unwrap_or(cells.len());
            if cells.len() <= column {
                cells.resize(column + 1, String::new());
            }
            cells[column] = cell_value(attrs, inner, shared);
        }
        while cells.last().is_some_and(String::is_empty) {
            cells.pop();
        }
        rows.push(cells);
    }

    rows
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    /// A minimal workbook whose first sheet holds `rows` as shared strings.
    pub(crate) fn xlsx_fixture(rows: &[&[&str]]) -> Vec<u8> {
        let mut strings: Vec<String> = Vec::new();
        let mut sheet = String::from(r#"<worksheet><sheetData>"#);
        for (r, row) in rows.iter().enumerate() {
            sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
            for (c, value) in row.iter().enumerate() {
                let column = char::from(b'A' + u8::try_from(c).unwrap());
                strings.push((*value).to_string());
                sheet.push_str(&format!(
                    r#"<c r="{column}{}" t="s"><v>{}</v></c>"#,
                    r + 1,
                    strings.len() - 1
                ));
            }
            sheet.push_str("</row>");
        }
        sheet.push_str("</sheetData></worksheet>");

        let mut shared = String::from("<sst>");
        for value in &strings {
            shared.push_str(&format!("<si><t>{value}</t></si>"));
        }
        shared.push_str("</sst>");

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in [
            (
                "xl/workbook.xml",
                r#"<workbook><sheets><sheet name="Items" sheetId="1" r:id="rId1"/></sheets></workbook>"#
                    .to_string(),
            ),
            (
                "xl/_rels/workbook.xml.rels",
                r#"<Relationships><Relationship Id="rId1" Type="worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#
                    .to_string(),
            ),
            ("xl/worksheets/sheet1.xml", sheet),
            ("xl/sharedStrings.xml", shared),
        ] {
            zip.start_file(name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn scratch(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn test_spreadsheet_rows_become_objects() {
        let file = scratch(&xlsx_fixture(&[
            &["item_id", "item_name"],
            &["1", "pen"],
            &["2"],
            &["3", "ink & paper"],
        ]));

        let value = read_file(file.path(), "items.xlsx").unwrap();
        assert_eq!(value["filename"], "items.xlsx");
        assert_eq!(
            value["data"],
            json!([
                {"item_id": "1", "item_name": "pen"},
                {"item_id": "3", "item_name": "ink & paper"}
            ])
        );
    }

    #[test]
    fn test_images_and_other_files() {
        let file = scratch(b"abc");

        let image = read_file(file.path(), "photo.JPG").unwrap();
        assert_eq!(image["data"], json!(["YWJj"]));

        let other = read_file(file.path(), "report.pdf").unwrap();
        assert_eq!(other["data"], "YWJj");
    }

    #[test]
    fn test_not_a_spreadsheet() {
        let file = scratch(b"plain text");
        let err = read_file(file.path(), "fake.xlsx").unwrap_err();
        assert!(matches!(err, MarshalError::UnsupportedSpreadsheet(_)));
    }

    #[test]
    fn test_sheet_parsing_details() {
        let xml = r#"<sheetData>
            <row r="1"><c r="A1" t="inlineStr"><is><t>a</t></is></c><c r="C1"><v>7</v></c></row>
            <row r="3"/>
            <row r="4"><c r="B4" t="b"><v>1</v></c><c r="C4" t="s"><v>0</v></c></row>
        </sheetData>"#;
        let rows = sheet_rows(xml, &["shared".to_string()]);

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], vec!["a", "", "7"]);
        assert!(rows[1].is_empty());
        assert!(rows[2].is_empty());
        assert_eq!(rows[3], vec!["", "TRUE", "shared"]);
    }

    #[test]
    fn test_escaped_text() {
        assert_eq!(
            unescape("Tom &amp; Jerry &lt;3&gt; &quot;q&quot; &apos;a&apos;"),
            r#"Tom & Jerry <3> "q" 'a'"#
        );
        assert_eq!(unescape("line&#10;break &#x41;&#66;"), "line\nbreak AB");
        assert_eq!(unescape("&amp;lt; stays escaped once"), "&lt; stays escaped once");
        assert_eq!(unescape("R&D; & co &bogus;"), "R&D; & co &bogus;");

        let shared = shared_strings(
            r#"<sst><si><r><t>Fish &amp;</t></r><r><t xml:space="preserve"> Chips</t></r></si><si/></sst>"#,
        );
        assert_eq!(shared, ["Fish & Chips", ""]);

        let xml = r#"<row r="1"><c r="A1" t="inlineStr"><is><t>&lt;b&gt; &amp; co</t></is></c><c r="B1" t="s"><v>0</v></c></row>"#;
        assert_eq!(sheet_rows(xml, &shared), vec![vec!["<b> & co", "Fish & Chips"]]);
    }

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("Z9"), Some(25));
        assert_eq!(column_index("AB12"), Some(27));
        assert_eq!(column_index("12"), None);
    }
}
