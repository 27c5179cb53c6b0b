//! Parser for the URL filter syntax, e.g.
//! `host_state!=0&(service_state=2|service_state=3)&!host_name=(a|b)`.

use crate::{
    error::{QueryError, Result},
    query::filter::{Filter, FilterExpression, FilterValue, Sign},
};

/// Parses `input` into a filter tree. An empty (or all whitespace) string
/// yields `None`.
pub fn parse_filter(input: &str) -> Result<Option<Filter>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    let mut parser = Parser {
        input,
        pos: 0,
        depth: 0,
    };
    let filter = parser.parse_or()?;
    if parser.pos < input.len() {
        return Err(invalid(format!(
            "unexpected \"{}\" at offset {}",
            &input[parser.pos..],
            parser.pos
        )));
    }
    Ok(Some(filter))
}

/// Deepest accepted nesting of `!` and `(...)`.
const MAX_DEPTH: usize = 64;

fn invalid(message: impl Into<String>) -> QueryError {
    QueryError::InvalidFilter(message.into())
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Filter> {
        let mut children = vec![self.parse_and()?];
        while self.eat(b'|') {
            children.push(self.parse_and()?);
        }
        Ok(collapse(children, Filter::Or))
    }

    fn parse_and(&mut self) -> Result<Filter> {
        let mut children = vec![self.parse_unary()?];
        while self.eat(b'&') {
            children.push(self.parse_unary()?);
        }
        Ok(collapse(children, Filter::And))
    }

    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(invalid(format!(
                "nesting deeper than {MAX_DEPTH} levels at offset {}",
                self.pos
            )));
        }
        Ok(())
    }

    fn parse_unary(&mut self) -> Result<Filter> {
        match self.peek() {
            Some(b'!') => {
                self.pos += 1;
                self.descend()?;
                let inner = self.parse_unary()?;
                self.depth -= 1;
                Ok(Filter::Not(vec![inner]))
            }
            Some(b'(') => {
                self.pos += 1;
                self.descend()?;
                let inner = self.parse_or()?;
                if !self.eat(b')') {
                    return Err(invalid(format!("unclosed group at offset {}", self.pos)));
                }
                self.depth -= 1;
                Ok(inner)
            }
            Some(_) => self.parse_condition(),
            None => Err(invalid("unexpected end of filter")),
        }
    }

    fn parse_condition(&mut self) -> Result<Filter> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if matches!(byte, b'=' | b'!' | b'<' | b'>' | b'&' | b'|' | b'(' | b')') {
                break;
            }
            self.pos += 1;
        }

        let column = decode(self.input[start..self.pos].trim())?;
        if column.is_empty() {
            return Err(invalid(format!("missing column at offset {start}")));
        }

        let Some(sign) = self.parse_sign()? else {
            return Ok(Filter::Expression(FilterExpression {
                column,
                sign: Sign::Eq,
                value: FilterValue::Scalar("1".to_string()),
            }));
        };

        let value = if self.eat(b'(') {
            let start = self.pos;
            let Some(close) = self.input[start..].find(')') else {
                return Err(invalid(format!("unclosed value list for \"{column}\"")));
            };
            self.pos = start + close + 1;
            let items = self.input[start..start + close]
                .split('|')
                .map(|item| decode(item.trim()))
                .collect::<Result<Vec<_>>>()?;
            FilterValue::List(items.into_iter().filter(|item| !item.is_empty()).collect())
        } else {
            let start = self.pos;
            while let Some(byte) = self.peek() {
                if matches!(byte, b'&' | b'|' | b')') {
                    break;
                }
                self.pos += 1;
            }
            FilterValue::Scalar(decode(self.input[start..self.pos].trim())?)
        };

        Ok(Filter::Expression(FilterExpression {
            column,
            sign,
            value,
        }))
    }

    fn parse_sign(&mut self) -> Result<Option<Sign>> {
        let sign = match self.peek() {
            Some(b'=') => Sign::Eq,
            Some(b'!') => {
                self.pos += 1;
                if self.peek() != Some(b'=') {
                    return Err(invalid(format!("expected \"!=\" at offset {}", self.pos)));
                }
                Sign::Ne
            }
            Some(b'<') => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    Sign::Le
                } else {
                    return Ok(Some(Sign::Lt));
                }
            }
            Some(b'>') => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    Sign::Ge
                } else {
                    return Ok(Some(Sign::Gt));
                }
            }
            _ => return Ok(None),
        };
        self.pos += 1;
        Ok(Some(sign))
    }
}

fn collapse(mut children: Vec<Filter>, chain: fn(Vec<Filter>) -> Filter) -> Filter {
    if children.len() == 1 {
        children.remove(0)
    } else {
        chain(children)
    }
}

fn decode(raw: &str) -> Result<String> {
    let plus_decoded = raw.replace('+', " ");
    urlencoding::decode(&plus_decoded)
        .map(|decoded| decoded.into_owned())
        .map_err(|err| invalid(format!("invalid percent encoding in \"{raw}\": {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Filter {
        parse_filter(input).unwrap().expect("filter")
    }

    #[test]
    fn empty_input_is_no_filter() {
        assert_eq!(parse_filter("").unwrap(), None);
        assert_eq!(parse_filter("   ").unwrap(), None);
    }

    #[test]
    fn parses_every_sign() {
        for (input, sign) in [
            ("a=1", Sign::Eq),
            ("a!=1", Sign::Ne),
            ("a<1", Sign::Lt),
            ("a<=1", Sign::Le),
            ("a>1", Sign::Gt),
            ("a>=1", Sign::Ge),
        ] {
            assert_eq!(parse(input), Filter::expression("a", sign, "1"), "{input}");
        }
    }

    #[test]
    fn bare_column_means_true() {
        assert_eq!(parse("host_problem"), Filter::equals("host_problem", "1"));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        assert_eq!(
            parse("a=1&b=2|c=3"),
            Filter::Or(vec![
                Filter::And(vec![Filter::equals("a", "1"), Filter::equals("b", "2")]),
                Filter::equals("c", "3"),
            ])
        );
    }

    #[test]
    fn groups_and_negation() {
        assert_eq!(
            parse("host_state!=0&!(service_state=2|service_state=3)"),
            Filter::And(vec![
                Filter::expression("host_state", Sign::Ne, "0"),
                Filter::Not(vec![Filter::Or(vec![
                    Filter::equals("service_state", "2"),
                    Filter::equals("service_state", "3"),
                ])]),
            ])
        );
    }

    #[test]
    fn list_values_and_percent_decoding() {
        assert_eq!(
            parse("host_name=(web%2D01|db 02)&comment_author=icinga%20admin"),
            Filter::And(vec![
                Filter::list("host_name", Sign::Eq, &["web-01", "db 02"]),
                Filter::equals("comment_author", "icinga admin"),
            ])
        );
        assert_eq!(parse("host_name=web*"), Filter::equals("host_name", "web*"));
    }

    #[test]
    fn relative_time_values_survive() {
        assert_eq!(
            parse("timestamp>-1+day"),
            Filter::expression("timestamp", Sign::Gt, "-1 day")
        );
    }

    #[test]
    fn nesting_depth_is_capped() {
        let deep_negation = format!("{}host_name=a", "!".repeat(200_000));
        assert!(matches!(
            parse_filter(&deep_negation),
            Err(QueryError::InvalidFilter(_))
        ));

        let deep_groups = format!("{}a=1{}", "(".repeat(100_000), ")".repeat(100_000));
        assert!(matches!(
            parse_filter(&deep_groups),
            Err(QueryError::InvalidFilter(_))
        ));

        let at_limit = format!("{}a=1{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert_eq!(parse(&at_limit), Filter::equals("a", "1"));
        assert_eq!(
            parse("!(a=1)&!(b=2)"),
            Filter::And(vec![
                Filter::Not(vec![Filter::equals("a", "1")]),
                Filter::Not(vec![Filter::equals("b", "2")]),
            ])
        );
    }

    #[test]
    fn rejects_malformed_input() {
        for input in ["(a=1", "a=1)", "=1", "a=(1|2", "a!1", "a=1&"] {
            assert!(
                matches!(parse_filter(input), Err(QueryError::InvalidFilter(_))),
                "{input} should be rejected"
            );
        }
    }
}
