//! Unwrapping of CAdES / PKCS#7 `.p7m` envelopes.
//!
//! Only the signed content is extracted; signatures are not verified.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use crate::core::ImportError;

/// Extracts the inner document from a DER-encoded signed envelope.
pub trait EnvelopeOpener {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Return the enveloped content, or a reason why it could not be read.
    fn open(&self, der: &[u8]) -> Result<Vec<u8>, String>;
}

/// True for `.p7m` file names, case insensitive.
pub fn is_enveloped(file_name: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with(".p7m")
}

/// Return the document bytes of a source file: enveloped files are
/// unwrapped with `opener`, anything else passes through.
pub fn extract_document(
    bytes: &[u8],
    file_name: &str,
    opener: &dyn EnvelopeOpener,
) -> Result<Vec<u8>, ImportError> {
    if !is_enveloped(file_name) {
        return Ok(bytes.to_vec());
    }
    let der = decode_armour(bytes);
    opener.open(&der).map_err(|reason| {
        ImportError::EnvelopeExtraction(format!("{file_name}: {reason}"))
    })
}

/// Some channels deliver envelopes base64 encoded, optionally with PEM
/// armour lines. Returns the DER bytes either way.
pub fn decode_armour(bytes: &[u8]) -> Vec<u8> {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return bytes.to_vec();
    };
    let body: String = text
        .lines()
        .filter(|l| !l.trim_start().starts_with("-----"))
        .flat_map(|l| l.chars())
        .filter(|c| !c.is_whitespace())
        .collect();
    if body.is_empty() {
        return bytes.to_vec();
    }
    match STANDARD.decode(body.as_bytes()) {
        Ok(der) => der,
        Err(_) => bytes.to_vec(),
    }
}

/// Runs the `openssl` binary: `cms -verify -noverify`, then the older
/// `smime` command for envelopes `cms` refuses.
#[derive(Debug, Clone)]
pub struct OpensslOpener {
    binary: PathBuf,
}

impl Default for OpensslOpener {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("openssl"),
        }
    }
}

impl OpensslOpener {
    /// Use a specific `openssl` executable.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str], der: &[u8]) -> Result<Vec<u8>, String> {
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("cannot run {}: {e}", self.binary.display()))?;

        // Feed stdin from a thread so a large output cannot block the write.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| "openssl stdin unavailable".to_string())?;
        let input = der.to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&input));

        let output = child
            .wait_with_output()
            .map_err(|e| format!("openssl failed: {e}"))?;
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(format!("writing to openssl failed: {e}")),
            Err(_) => return Err("openssl writer thread panicked".into()),
        }

        if output.status.success() && !output.stdout.is_empty() {
            Ok(output.stdout)
        } else {
            Err(format!(
                "openssl {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }
}

impl EnvelopeOpener for OpensslOpener {
    fn name(&self) -> &'static str {
        "openssl"
    }

    fn open(&self, der: &[u8]) -> Result<Vec<u8>, String> {
        let cms = ["cms", "-verify", "-noverify", "-inform", "DER", "-binary"];
        match self.run(&cms, der) {
            Ok(out) => Ok(out),
            Err(cms_err) => {
                debug!(error = %cms_err, "openssl cms failed, trying smime");
                let smime = ["smime", "-verify", "-noverify", "-inform", "DER", "-binary"];
                self.run(&smime, der)
                    .map_err(|smime_err| format!("{cms_err}; {smime_err}"))
            }
        }
    }
}

/// Locates the XML document inside the DER blob by its markers.
///
/// Works when the signed content is stored as one contiguous octet string,
/// which is what SDI and most signing tools produce.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOpener;

impl EnvelopeOpener for ScanOpener {
    fn name(&self) -> &'static str {
        "scan"
    }

    fn open(&self, der: &[u8]) -> Result<Vec<u8>, String> {
        let marker = find(der, b"FatturaElettronica")
            .ok_or_else(|| "no FatturaElettronica element in envelope".to_string())?;
        let start = match find(der, b"<?xml") {
            Some(decl) if decl < marker => decl,
            _ => der[..marker]
                .iter()
                .rposition(|&b| b == b'<')
                .ok_or_else(|| "no root element start in envelope".to_string())?,
        };
        let last = rfind(der, b"FatturaElettronica")
            .filter(|&p| p > marker)
            .ok_or_else(|| "no closing root element in envelope".to_string())?;
        let end = der[last..]
            .iter()
            .position(|&b| b == b'>')
            .map(|p| last + p + 1)
            .ok_or_else(|| "unterminated root element in envelope".to_string())?;
        Ok(der[start..end].to_vec())
    }
}

/// Tries each opener in turn, returning the first success.
pub struct ChainOpener {
    openers: Vec<Box<dyn EnvelopeOpener>>,
}

impl ChainOpener {
    pub fn new(openers: Vec<Box<dyn EnvelopeOpener>>) -> Self {
        Self { openers }
    }
}

impl Default for ChainOpener {
    /// `openssl` first, marker scan as fallback.
    fn default() -> Self {
        Self::new(vec![Box::new(OpensslOpener::default()), Box::new(ScanOpener)])
    }
}

impl EnvelopeOpener for ChainOpener {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn open(&self, der: &[u8]) -> Result<Vec<u8>, String> {
        let mut reasons = Vec::new();
        for opener in &self.openers {
            match opener.open(der) {
                Ok(inner) => {
                    debug!(opener = opener.name(), "envelope opened");
                    return Ok(inner);
                }
                Err(reason) => reasons.push(format!("{}: {reason}", opener.name())),
            }
        }
        if reasons.is_empty() {
            return Err("no envelope openers configured".into());
        }
        Err(reasons.join("; "))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
