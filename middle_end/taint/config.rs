//! The taint configuration format: sources, sinks, and transfers.
//!
//! ```text
//! source   { method: Net::read(),           type: secret }
//! sink     { method: Log::write(int),       index: 0 }
//! transfer { method: Text::concat(int,int), from: arg0, to: result, type: secret }
//! ```

use std::str::FromStr;

use pest::iterators::Pair;
use pest::Parser;

use derive_more::Display;

#[derive(pest_derive::Parser)]
#[grammar_inline = r#"
WHITESPACE = _{ " " | "\t" | "\r" | "\n" }
COMMENT = _{ "//" ~ (!"\n" ~ ANY)* }

config = { SOI ~ entry* ~ EOI }
entry = _{ source | sink | transfer }

source = { "source" ~ "{" ~ "method" ~ ":" ~ method ~ "," ~ "type" ~ ":" ~ ident ~ "}" }
sink = { "sink" ~ "{" ~ "method" ~ ":" ~ method ~ "," ~ "index" ~ ":" ~ num ~ "}" }
transfer = { "transfer" ~ "{" ~ "method" ~ ":" ~ method ~ "," ~ "from" ~ ":" ~ loc ~ "," ~ "to" ~ ":" ~ loc ~ "," ~ "type" ~ ":" ~ ident ~ "}" }

method = { ident ~ "::" ~ ident ~ "(" ~ typelist? ~ ")" }
typelist = { typ ~ ("," ~ typ)* }
typ = @{ ident ~ ("[]")* }

loc = { base | result | arg }
base = { "base" }
result = { "result" }
arg = { "arg" ~ num }

ident = @{ (ASCII_ALPHA | "_") ~ (ASCII_ALPHANUMERIC | "_")* }
num = @{ ASCII_DIGIT+ }
"#]
struct ConfigParser;

#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub struct TaintConfigError(pub String);
impl std::error::Error for TaintConfigError {}

/// A method named in the configuration, before resolution against the
/// program: class, method name, and parameter type names.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MethodPattern {
    pub class: String,
    pub name: String,
    pub params: Vec<String>,
}

/// Where a transfer reads from or writes to at a call site.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaintLoc {
    Base,
    Result,
    Arg(usize),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceSpec {
    pub method: MethodPattern,
    pub label: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SinkSpec {
    pub method: MethodPattern,
    pub index: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferSpec {
    pub method: MethodPattern,
    pub from: TaintLoc,
    pub to: TaintLoc,
    pub label: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TaintConfig {
    pub sources: Vec<SourceSpec>,
    pub sinks: Vec<SinkSpec>,
    pub transfers: Vec<TransferSpec>,
}

impl FromStr for TaintConfig {
    type Err = TaintConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut pairs = ConfigParser::parse(Rule::config, s)
            .map_err(|e| TaintConfigError(e.to_string()))?;
        let config = pairs.next().expect("grammar yields a config node");

        let mut result = TaintConfig::default();
        for entry in config.into_inner() {
            match entry.as_rule() {
                Rule::source => {
                    let mut inner = entry.into_inner();
                    result.sources.push(SourceSpec {
                        method: method_pattern(inner.next().unwrap()),
                        label: inner.next().unwrap().as_str().to_string(),
                    });
                }
                Rule::sink => {
                    let mut inner = entry.into_inner();
                    result.sinks.push(SinkSpec {
                        method: method_pattern(inner.next().unwrap()),
                        index: parse_num(inner.next().unwrap())?,
                    });
                }
                Rule::transfer => {
                    let mut inner = entry.into_inner();
                    result.transfers.push(TransferSpec {
                        method: method_pattern(inner.next().unwrap()),
                        from: taint_loc(inner.next().unwrap())?,
                        to: taint_loc(inner.next().unwrap())?,
                        label: inner.next().unwrap().as_str().to_string(),
                    });
                }
                Rule::EOI => (),
                r => unreachable!("unexpected rule {r:?} in config"),
            }
        }
        Ok(result)
    }
}

fn method_pattern(pair: Pair<Rule>) -> MethodPattern {
    let mut inner = pair.into_inner();
    let class = inner.next().unwrap().as_str().to_string();
    let name = inner.next().unwrap().as_str().to_string();
    let params = match inner.next() {
        Some(list) => list.into_inner().map(|t| t.as_str().to_string()).collect(),
        None => vec![],
    };
    MethodPattern {
        class,
        name,
        params,
    }
}

fn taint_loc(pair: Pair<Rule>) -> Result<TaintLoc, TaintConfigError> {
    let inner = pair.into_inner().next().expect("loc has one alternative");
    Ok(match inner.as_rule() {
        Rule::base => TaintLoc::Base,
        Rule::result => TaintLoc::Result,
        Rule::arg => TaintLoc::Arg(parse_num(inner.into_inner().next().unwrap())?),
        r => unreachable!("unexpected rule {r:?} in loc"),
    })
}

fn parse_num(pair: Pair<Rule>) -> Result<usize, TaintConfigError> {
    pair.as_str()
        .parse()
        .map_err(|_| TaintConfigError(format!("index `{}` out of range", pair.as_str())))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_all_entry_kinds() {
        let config: TaintConfig = r#"
            // reads untrusted input
            source { method: Net::read(), type: secret }
            sink { method: Log::write(int), index: 0 }
            transfer { method: Text::concat(int, int[]), from: arg1, to: result, type: secret }
            transfer { method: Text::append(int), from: base, to: base, type: secret }
        "#
        .parse()
        .unwrap();

        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].label, "secret");
        assert_eq!(config.sinks[0].index, 0);
        assert_eq!(config.transfers[0].from, TaintLoc::Arg(1));
        assert_eq!(config.transfers[0].to, TaintLoc::Result);
        assert_eq!(
            config.transfers[0].method.params,
            vec!["int".to_string(), "int[]".to_string()]
        );
        assert_eq!(config.transfers[1].from, TaintLoc::Base);
    }

    #[test]
    fn rejects_malformed_config() {
        let bad = "source { method: Net::read(), }".parse::<TaintConfig>();
        assert!(bad.is_err());
    }
}
