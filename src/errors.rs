// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Error taxonomy for the crawl pipeline. Configuration errors are fatal
//! before the first request; everything else is counted and logged.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpiderError {
    /// Fatal before any request: bad output dir, unreadable sites file,
    /// invalid scope regex.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// DNS, connect, TLS or read failures; counted, never fatal.
    #[error("Transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    /// Browser launch/navigation/evaluation failures; disable hybrid and
    /// continue.
    #[error("Browser error: {0}")]
    Browser(String),

    /// HTML/JSON/JS parse failures; the offending response is skipped.
    #[error("Parse error in {context}: {reason}")]
    Parse { context: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_carry_context() {
        let err = SpiderError::Transport {
            url: "https://t/".into(),
            reason: "connection refused".into(),
        };
        assert!(err.to_string().contains("https://t/"));
        assert!(err.to_string().contains("connection refused"));
    }
}
