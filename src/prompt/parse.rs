//! Parser for the request mini-language.
//!
//! A message is free prompt text optionally followed by flags:
//!
//! ```text
//! a red fox in the snow --width 768 -h 512 --no blurry, lowres -c 4
//! ```
//!
//! Flags accept both `--flag value` and `--flag=value` forms. Repeated flags
//! are last-wins. Parsing never fails: a numeric flag with an unparseable
//! value is ignored and the previous value (if any) is kept.

/// Structured request parameters extracted from a raw message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPrompt {
    /// Free text before the first flag.
    pub prompt: String,
    /// Requested image width.
    pub width: Option<u32>,
    /// Requested image height.
    pub height: Option<u32>,
    /// Requested model name.
    pub model: Option<String>,
    /// Extra negative prompt text.
    pub negative_prompt: Option<String>,
    /// Requested batch size.
    pub count: Option<u32>,
    /// Requested sampler seed. `-1` means "pick one at random".
    pub seed: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    Width,
    Height,
    Model,
    NegativePrompt,
    Count,
    Seed,
}

const ALIASES: &[(&str, Flag)] = &[
    ("--width", Flag::Width),
    ("-w", Flag::Width),
    ("--height", Flag::Height),
    ("-h", Flag::Height),
    ("--model", Flag::Model),
    ("-m", Flag::Model),
    ("--no", Flag::NegativePrompt),
    ("--negative", Flag::NegativePrompt),
    ("-n", Flag::NegativePrompt),
    ("--count", Flag::Count),
    ("-c", Flag::Count),
    ("--seed", Flag::Seed),
    ("-s", Flag::Seed),
];

/// Split a token into a recognized flag and an optional inline `=value`.
fn match_flag(token: &str) -> Option<(Flag, Option<&str>)> {
    for (alias, flag) in ALIASES {
        if token == *alias {
            return Some((*flag, None));
        }
        if let Some(rest) = token.strip_prefix(alias) {
            if let Some(inline) = rest.strip_prefix('=') {
                return Some((*flag, Some(inline)));
            }
        }
    }
    None
}

/// Parse a raw request message. Never fails; malformed flag values are
/// silently dropped.
pub fn parse_message(input: &str) -> ParsedPrompt {
    let mut parsed = ParsedPrompt::default();

    let tokens: Vec<&str> = input.split_whitespace().collect();
    let first_flag = tokens.iter().position(|t| match_flag(t).is_some());

    let prompt_end = first_flag.unwrap_or(tokens.len());
    parsed.prompt = tokens[..prompt_end].join(" ");

    let mut i = prompt_end;
    while i < tokens.len() {
        // The position scan guarantees tokens[i] is a flag here.
        let Some((flag, inline)) = match_flag(tokens[i]) else {
            i += 1;
            continue;
        };
        i += 1;
        let value = match inline {
            Some(inline) => inline.trim().to_string(),
            None => {
                let start = i;
                while i < tokens.len() && match_flag(tokens[i]).is_none() {
                    i += 1;
                }
                let value = tokens[start..i].join(" ");
                // `--flag = value` with spaced equals.
                value
                    .strip_prefix('=')
                    .map(|v| v.trim().to_string())
                    .unwrap_or(value)
            }
        };
        apply_flag(&mut parsed, flag, &value);
    }

    parsed
}

fn apply_flag(parsed: &mut ParsedPrompt, flag: Flag, value: &str) {
    match flag {
        Flag::Width => {
            if let Ok(v) = value.parse() {
                parsed.width = Some(v);
            }
        }
        Flag::Height => {
            if let Ok(v) = value.parse() {
                parsed.height = Some(v);
            }
        }
        Flag::Count => {
            if let Ok(v) = value.parse() {
                parsed.count = Some(v);
            }
        }
        Flag::Seed => {
            if let Ok(v) = value.parse() {
                parsed.seed = Some(v);
            }
        }
        Flag::Model => parsed.model = Some(value.to_string()),
        Flag::NegativePrompt => parsed.negative_prompt = Some(value.to_string()),
    }
}
