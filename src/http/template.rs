//! Server-side include processing
//!
//! Files flagged for SSI are streamed through a two-state scanner. In copy
//! mode bytes pass straight through until the intro marker `<!--#echo` has
//! been seen; directive mode then collects bytes up to the end marker `-->`
//! and replaces the whole directive with the value of its `var="name"`
//! attribute.

use std::io::{self, Read, Write};

/// Marker that opens a directive
pub const INTRO: &[u8] = b"<!--#echo";

/// Marker that closes a directive
pub const END: &[u8] = b"-->";

/// Longest directive body accepted before it is emitted verbatim
pub const MAX_DIRECTIVE: usize = 256;

/// Substituted for unknown variables
pub const UNKNOWN_VALUE: &str = "(none)";

const CHUNK: usize = 4096;

/// Copy `input` to `output`, expanding SSI directives through `lookup`
///
/// Returns the number of bytes written.
pub fn render<R, W, F>(mut input: R, output: &mut W, lookup: F) -> io::Result<u64>
where
    R: Read,
    W: Write,
    F: Fn(&str) -> Option<String>,
{
    let mut scanner = Scanner::default();
    let mut chunk = [0u8; CHUNK];
    let mut out = Vec::with_capacity(CHUNK * 2);
    let mut written = 0u64;

    loop {
        let n = match input.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        for &byte in &chunk[..n] {
            scanner.feed(byte, &mut out, &lookup);
        }

        if out.len() >= CHUNK {
            output.write_all(&out)?;
            written += out.len() as u64;
            out.clear();
        }
    }

    scanner.finish(&mut out);
    output.write_all(&out)?;
    written += out.len() as u64;
    output.flush()?;

    Ok(written)
}

#[derive(Debug, Default)]
struct Scanner {
    matched: usize,
    directive: Option<Vec<u8>>,
}

impl Scanner {
    fn feed<F>(&mut self, byte: u8, out: &mut Vec<u8>, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        match self.directive.as_mut() {
            None => self.copy(byte, out),
            Some(body) => {
                body.push(byte);
                if body.ends_with(END) {
                    let body = self.directive.take().unwrap_or_default();
                    let value = expand(&body[..body.len() - END.len()], lookup);
                    out.extend_from_slice(value.as_bytes());
                } else if body.len() > MAX_DIRECTIVE {
                    let body = self.directive.take().unwrap_or_default();
                    out.extend_from_slice(INTRO);
                    out.extend_from_slice(&body);
                }
            }
        }
    }

    fn copy(&mut self, byte: u8, out: &mut Vec<u8>) {
        if byte == INTRO[self.matched] {
            self.matched += 1;
            if self.matched == INTRO.len() {
                self.matched = 0;
                self.directive = Some(Vec::new());
            }
            return;
        }

        out.extend_from_slice(&INTRO[..self.matched]);
        self.matched = 0;
        if byte == INTRO[0] {
            self.matched = 1;
        } else {
            out.push(byte);
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        out.extend_from_slice(&INTRO[..self.matched]);
        self.matched = 0;
        if let Some(body) = self.directive.take() {
            out.extend_from_slice(INTRO);
            out.extend_from_slice(&body);
        }
    }
}

fn expand<F>(body: &[u8], lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let body = String::from_utf8_lossy(body);
    var_attribute(&body)
        .and_then(|name| lookup(name))
        .unwrap_or_else(|| UNKNOWN_VALUE.to_string())
}

/// Extract the value of a `var="name"` (or `var='name'`) attribute
fn var_attribute(body: &str) -> Option<&str> {
    let start = body.find("var=")? + "var=".len();
    let rest = &body[start..];
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(&rest[..end])
}
