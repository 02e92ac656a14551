use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path};

use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};

use crate::error::{Error, Result};

pub fn validate_rel_like_path(p: &str) -> Result<()> {
    let path = p.trim();
    if path.is_empty() {
        return Err(Error::msg("path is empty"));
    }
    let pb = Path::new(path);
    if pb.is_absolute() {
        return Err(Error::msg(format!("path '{}' is absolute", path)));
    }
    if pb.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(Error::msg(format!("path '{}' contains '..'", path)));
    }
    Ok(())
}

pub fn ensure_dir(p: &Path) -> Result<()> {
    fs::create_dir_all(p)
        .map_err(|e| Error::msg(format!("failed to create dir {}: {e}", p.display())))
}

/// Pretty printer that escapes every non-ASCII character as `\uXXXX`,
/// using surrogate pairs above U+FFFF.
struct AsciiPretty<'a>(PrettyFormatter<'a>);

impl Formatter for AsciiPretty<'_> {
    fn begin_array<W: ?Sized + io::Write>(&mut self, w: &mut W) -> io::Result<()> {
        self.0.begin_array(w)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, w: &mut W) -> io::Result<()> {
        self.0.end_array(w)
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        w: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_array_value(w, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, w: &mut W) -> io::Result<()> {
        self.0.end_array_value(w)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, w: &mut W) -> io::Result<()> {
        self.0.begin_object(w)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, w: &mut W) -> io::Result<()> {
        self.0.end_object(w)
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        w: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_object_key(w, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, w: &mut W) -> io::Result<()> {
        self.0.begin_object_value(w)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, w: &mut W) -> io::Result<()> {
        self.0.end_object_value(w)
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        w: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            w.write_all(&fragment.as_bytes()[start..i])?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(w, "\\u{unit:04x}")?;
            }
            start = i + ch.len_utf8();
        }
        w.write_all(&fragment.as_bytes()[start..])
    }
}

/// JSON with 4-space indentation, ASCII-only text and a trailing newline.
pub fn to_pretty_json<T: Serialize>(v: &T) -> Result<String> {
    let mut buf = Vec::new();
    let fmt = AsciiPretty(PrettyFormatter::with_indent(b"    "));
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, fmt);
    v.serialize(&mut ser)
        .map_err(|e| Error::msg(format!("json encode error: {e}")))?;
    buf.push(b'\n');
    String::from_utf8(buf).map_err(|e| Error::msg(format!("json encode error: {e}")))
}

/// Replaces `path` in one step: the body goes to a sibling temp file first.
pub fn atomic_write_text(path: &Path, body: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    ensure_dir(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| {
        Error::msg(format!(
            "failed to create temp file in {}: {e}",
            parent.display()
        ))
    })?;
    tmp.write_all(body.as_bytes())
        .and_then(|_| tmp.flush())
        .map_err(|e| Error::msg(format!("failed to write temp file for {}: {e}", path.display())))?;
    tmp.persist(path).map_err(|e| {
        Error::msg(format!(
            "failed to rename temp file -> {}: {}",
            path.display(),
            e.error
        ))
    })?;
    Ok(())
}

pub fn write_json_pretty<T: Serialize>(p: &Path, v: &T) -> Result<()> {
    let body = to_pretty_json(v)?;
    atomic_write_text(p, &body)
}

pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    fs::copy(src, dst).map_err(|e| {
        Error::msg(format!(
            "failed to copy {} -> {}: {e}",
            src.display(),
            dst.display()
        ))
    })?;
    Ok(())
}
