//! Just enough XML-RPC to talk to a ROS master.
//!
//! Supports the value types the master API produces: strings, integers,
//! booleans, doubles, arrays, structs and nil.

use std::fmt::Write as _;

use crate::error::{Error, Result};

/// An XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Double(f64),
    Str(String),
    Array(Vec<Value>),
    Struct(Vec<(String, Value)>),
    Nil,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a struct member.
    pub fn member(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(members) => members.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    fn write_xml(&self, out: &mut String) {
        out.push_str("<value>");
        match self {
            Value::Int(i) => {
                let _ = write!(out, "<int>{}</int>", i);
            }
            Value::Bool(b) => {
                let _ = write!(out, "<boolean>{}</boolean>", u8::from(*b));
            }
            Value::Double(d) => {
                let _ = write!(out, "<double>{}</double>", d);
            }
            Value::Str(s) => {
                out.push_str("<string>");
                escape_into(s, out);
                out.push_str("</string>");
            }
            Value::Array(items) => {
                out.push_str("<array><data>");
                for item in items {
                    item.write_xml(out);
                }
                out.push_str("</data></array>");
            }
            Value::Struct(members) => {
                out.push_str("<struct>");
                for (name, value) in members {
                    out.push_str("<member><name>");
                    escape_into(name, out);
                    out.push_str("</name>");
                    value.write_xml(out);
                    out.push_str("</member>");
                }
                out.push_str("</struct>");
            }
            Value::Nil => out.push_str("<nil/>"),
        }
        out.push_str("</value>");
    }
}

/// Serialize a method call document.
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?><methodCall><methodName>");
    escape_into(method, &mut out);
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        param.write_xml(&mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

/// Parse a method response document into its single return value.
///
/// Faults become [`Error::Registry`] carrying the fault string.
pub fn parse_response(text: &str) -> Result<Value> {
    let mut reader = Reader::new(text);
    reader.skip_prolog()?;
    reader.open("methodResponse")?;
    let tag = reader.peek_tag()?;
    let value = match tag.name.as_str() {
        "params" => {
            reader.open("params")?;
            reader.open("param")?;
            let value = reader.value()?;
            reader.close("param")?;
            reader.close("params")?;
            value
        }
        "fault" => {
            reader.open("fault")?;
            let fault = reader.value()?;
            let message = fault
                .member("faultString")
                .and_then(Value::as_str)
                .unwrap_or("unknown fault")
                .to_string();
            return Err(Error::Registry(format!("XML-RPC fault: {}", message)));
        }
        other => return Err(malformed(format!("unexpected <{}>", other))),
    };
    reader.close("methodResponse")?;
    Ok(value)
}

fn escape_into(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::Registry(format!("malformed XML-RPC response: {}", msg.into()))
}

#[derive(Debug)]
struct Tag {
    name: String,
    closing: bool,
    self_closing: bool,
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn skip_prolog(&mut self) -> Result<()> {
        loop {
            self.skip_ws();
            let rest = self.rest();
            let end = if rest.starts_with("<?") {
                rest.find("?>").map(|i| i + 2)
            } else if rest.starts_with("<!--") {
                rest.find("-->").map(|i| i + 3)
            } else {
                return Ok(());
            };
            self.pos += end.ok_or_else(|| malformed("unterminated prolog"))?;
        }
    }

    /// Read the next tag, skipping leading whitespace.
    fn tag(&mut self) -> Result<Tag> {
        self.skip_ws();
        let rest = self.rest();
        if !rest.starts_with('<') {
            return Err(malformed(format!("expected a tag at offset {}", self.pos)));
        }
        let end = rest.find('>').ok_or_else(|| malformed("unterminated tag"))?;
        let mut inner = &rest[1..end];
        self.pos += end + 1;

        let closing = inner.starts_with('/');
        if closing {
            inner = &inner[1..];
        }
        let self_closing = inner.ends_with('/');
        if self_closing {
            inner = &inner[..inner.len() - 1];
        }
        let name = inner.split_whitespace().next().unwrap_or("").to_string();
        Ok(Tag {
            name,
            closing,
            self_closing,
        })
    }

    fn peek_tag(&mut self) -> Result<Tag> {
        let pos = self.pos;
        let tag = self.tag();
        self.pos = pos;
        tag
    }

    /// Consume `<name>`; returns false for `<name/>`.
    fn open(&mut self, name: &str) -> Result<bool> {
        let tag = self.tag()?;
        if tag.closing || tag.name != name {
            return Err(malformed(format!("expected <{}>, found {:?}", name, tag)));
        }
        Ok(!tag.self_closing)
    }

    fn close(&mut self, name: &str) -> Result<()> {
        let tag = self.tag()?;
        if !tag.closing || tag.name != name {
            return Err(malformed(format!("expected </{}>, found {:?}", name, tag)));
        }
        Ok(())
    }

    /// Raw text up to the next tag, unescaped.
    fn text(&mut self) -> String {
        let rest = self.rest();
        let end = rest.find('<').unwrap_or(rest.len());
        self.pos += end;
        unescape(&rest[..end])
    }

    fn value(&mut self) -> Result<Value> {
        if !self.open("value")? {
            return Ok(Value::Str(String::new()));
        }
        let text = self.text();
        let next = self.peek_tag()?;
        if next.closing && next.name == "value" {
            // Untyped values are strings.
            self.close("value")?;
            return Ok(Value::Str(text));
        }

        let tag = self.tag()?;
        let value = if tag.self_closing {
            match tag.name.as_str() {
                "nil" => Value::Nil,
                "string" => Value::Str(String::new()),
                "array" => Value::Array(Vec::new()),
                "struct" => Value::Struct(Vec::new()),
                other => return Err(malformed(format!("empty <{}/>", other))),
            }
        } else {
            let value = match tag.name.as_str() {
                "string" => Value::Str(self.text()),
                "int" | "i4" | "i8" => {
                    let text = self.text();
                    Value::Int(
                        text.trim()
                            .parse()
                            .map_err(|_| malformed(format!("bad integer '{}'", text)))?,
                    )
                }
                "boolean" => Value::Bool(self.text().trim() == "1"),
                "double" => {
                    let text = self.text();
                    Value::Double(
                        text.trim()
                            .parse()
                            .map_err(|_| malformed(format!("bad double '{}'", text)))?,
                    )
                }
                "nil" => Value::Nil,
                "array" => Value::Array(self.array_items()?),
                "struct" => Value::Struct(self.struct_members()?),
                other => return Err(malformed(format!("unsupported type <{}>", other))),
            };
            self.close(&tag.name)?;
            value
        };
        self.close("value")?;
        Ok(value)
    }

    fn array_items(&mut self) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        if !self.open("data")? {
            return Ok(items);
        }
        loop {
            let next = self.peek_tag()?;
            if next.closing {
                break;
            }
            items.push(self.value()?);
        }
        self.close("data")?;
        Ok(items)
    }

    fn struct_members(&mut self) -> Result<Vec<(String, Value)>> {
        let mut members = Vec::new();
        loop {
            let next = self.peek_tag()?;
            if next.closing {
                break;
            }
            self.open("member")?;
            self.open("name")?;
            let name = self.text();
            self.close("name")?;
            let value = self.value()?;
            self.close("member")?;
            members.push((name, value));
        }
        Ok(members)
    }
}
