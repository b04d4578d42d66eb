//! Obfuscation of the login credentials.
//!
//! The portal's login page runs a small script that interleaves the
//! credentials with characters taken from a server-issued pool. The server
//! checks the submitted `encoded` field against its own rendition of that
//! script, so the output has to match character for character, quirks
//! included.

use crate::error::MonitorError;

/// Positions past this index stop the interleave and append the rest of the
/// credential string verbatim.
const INTERLEAVE_LIMIT: usize = 20;

const CREDENTIAL_SEPARATOR: &str = "%%%";

/// Server-issued `"<code>#<sxh>"` string, fetched once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    code: Vec<char>,
    sxh: Vec<u32>,
}

impl Challenge {
    pub fn parse(raw: &str) -> Result<Self, MonitorError> {
        let Some((code, sxh)) = raw.trim().split_once('#') else {
            return Err(MonitorError::MalformedChallenge(raw.trim().to_string()));
        };
        Ok(Self {
            code: code.chars().collect(),
            // A stray non-digit repeats nothing.
            sxh: sxh.chars().map(|c| c.to_digit(10).unwrap_or(0)).collect(),
        })
    }

    fn repeats_at(&self, position: usize) -> u32 {
        self.sxh.get(position).copied().unwrap_or(0)
    }
}

pub fn encode(challenge: &Challenge, account: &str, secret: &str) -> String {
    let data: Vec<char> = format!("{account}{CREDENTIAL_SEPARATOR}{secret}")
        .chars()
        .collect();
    interleave(challenge, &data)
}

fn interleave(challenge: &Challenge, data: &[char]) -> String {
    let code = &challenge.code;
    let mut encoded = String::new();
    let mut b = 0usize;

    for a in 0..code.len() {
        if a >= INTERLEAVE_LIMIT {
            if let Some(tail) = data.get(a..) {
                encoded.extend(tail);
            }
            break;
        }
        if let Some(c) = data.get(a) {
            encoded.push(*c);
        }
        // The cursor keeps advancing past the end of the pool.
        for _ in 0..challenge.repeats_at(a) {
            if let Some(c) = code.get(b) {
                encoded.push(*c);
            }
            b += 1;
        }
    }
    encoded
}
