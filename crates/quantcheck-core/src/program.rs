use std::fmt;
use std::path::Path;

use crate::descriptor::{parse_descriptor, TensorDescriptor};
use crate::error::{Error, Result};
use crate::variant::ProgramVariant;

// Program format — the textual reference programs the harness compiles
//
// A program is a named signature plus a one-op body:
//
//   @program { name: "dequantize_s_int8_channel_scaled"; }
//   @signature {
//       input x: 2x3x4x5xqi8_X;
//       input scale: 3xf32_X;
//       input zero_point: 3xf32_X;
//       output y: f32_X;
//   }
//   @body {
//       y = dequantize(x, scale, zero_point) { axis: 1; };
//   }
//
// Signature types are descriptor tokens — one grammar for both the fixture
// wire format and the program format. The harness consults only the name
// and the signature; backends interpret the body. A rank-0 output
// descriptor constrains dtype only; output shape correctness is judged
// against the reference result.

/// An attribute value on a body statement.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl AttrValue {
    /// The attribute as a non-negative integer, if it is one.
    pub fn as_usize(&self) -> Option<usize> {
        match self {
            AttrValue::Int(i) if *i >= 0 => Some(*i as usize),
            _ => None,
        }
    }
}

/// One body statement: `result = op(arg, ...) { key: value; ... };`
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub result: String,
    pub op: String,
    pub args: Vec<String>,
    pub attrs: Vec<(String, AttrValue)>,
}

impl Statement {
    /// Look up an attribute by name.
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

/// A parsed program: name, declared inputs/outputs, and the body.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub name: String,
    pub inputs: Vec<(String, TensorDescriptor)>,
    pub outputs: Vec<(String, TensorDescriptor)>,
    pub body: Vec<Statement>,
}

impl Program {
    /// Parse a program from source text.
    pub fn parse(source: &str) -> Result<Self> {
        Parser::new(source).parse()
    }

    /// Load a program from a file. If the `@program` block omits a name,
    /// the file stem is used.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Error::msg(format!("cannot read program {}: {}", path.display(), e)))?;
        let mut program = Self::parse(&source)?;
        if program.name.is_empty() {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                program.name = stem.to_string();
            }
        }
        Ok(program)
    }

    /// The shape-specialization variant embedded in the program name, if any.
    pub fn variant(&self) -> Option<ProgramVariant> {
        ProgramVariant::detect_in_name(&self.name)
    }

    /// The declared input descriptors, in order.
    pub fn input_descriptors(&self) -> Vec<TensorDescriptor> {
        self.inputs.iter().map(|(_, d)| d.clone()).collect()
    }

    /// The declared output descriptors, in order.
    pub fn output_descriptors(&self) -> Vec<TensorDescriptor> {
        self.outputs.iter().map(|(_, d)| d.clone()).collect()
    }

    /// Index of a named operand among the declared inputs.
    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|(n, _)| n == name)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "@program {{ name: \"{}\"; }}", self.name)?;
        writeln!(f, "@signature {{")?;
        for (name, desc) in &self.inputs {
            writeln!(f, "    input {}: {};", name, desc)?;
        }
        for (name, desc) in &self.outputs {
            writeln!(f, "    output {}: {};", name, desc)?;
        }
        writeln!(f, "}}")?;
        writeln!(f, "@body {{")?;
        for stmt in &self.body {
            write!(f, "    {} = {}({})", stmt.result, stmt.op, stmt.args.join(", "))?;
            if !stmt.attrs.is_empty() {
                write!(f, " {{ ")?;
                for (key, value) in &stmt.attrs {
                    match value {
                        AttrValue::Int(i) => write!(f, "{}: {}; ", key, i)?,
                        AttrValue::Float(x) => write!(f, "{}: {}; ", key, x)?,
                        AttrValue::Str(s) => write!(f, "{}: \"{}\"; ", key, s)?,
                    }
                }
                write!(f, "}}")?;
            }
            writeln!(f, ";")?;
        }
        writeln!(f, "}}")
    }
}

// Cursor parser

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn parse(mut self) -> Result<Program> {
        let mut program = Program {
            name: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            body: Vec::new(),
        };
        let mut saw_signature = false;

        loop {
            self.skip_trivia();
            if self.at_end() {
                break;
            }
            self.expect('@')?;
            let block = self.ident()?;
            match block.as_str() {
                "program" => self.parse_meta(&mut program)?,
                "signature" => {
                    self.parse_signature(&mut program)?;
                    saw_signature = true;
                }
                "body" => self.parse_body(&mut program)?,
                other => return Err(self.err(format!("unknown block `@{}`", other))),
            }
        }

        if !saw_signature {
            return Err(self.err("program has no @signature block".to_string()));
        }
        Ok(program)
    }

    fn parse_meta(&mut self, program: &mut Program) -> Result<()> {
        self.skip_trivia();
        self.expect('{')?;
        loop {
            self.skip_trivia();
            if self.eat('}') {
                return Ok(());
            }
            let key = self.ident()?;
            self.skip_trivia();
            self.expect(':')?;
            match key.as_str() {
                "name" => {
                    program.name = self.string_lit()?;
                }
                other => return Err(self.err(format!("unknown program key `{}`", other))),
            }
            self.skip_trivia();
            self.expect(';')?;
        }
    }

    fn parse_signature(&mut self, program: &mut Program) -> Result<()> {
        self.skip_trivia();
        self.expect('{')?;
        loop {
            self.skip_trivia();
            if self.eat('}') {
                return Ok(());
            }
            let kw = self.ident()?;
            self.skip_trivia();
            let name = self.ident()?;
            self.skip_trivia();
            self.expect(':')?;
            self.skip_trivia();
            let token = self.until(';')?;
            let desc = parse_descriptor(token.trim())?;
            self.expect(';')?;
            match kw.as_str() {
                "input" => program.inputs.push((name, desc)),
                "output" => program.outputs.push((name, desc)),
                other => {
                    return Err(self.err(format!("expected `input` or `output`, got `{}`", other)))
                }
            }
        }
    }

    fn parse_body(&mut self, program: &mut Program) -> Result<()> {
        self.skip_trivia();
        self.expect('{')?;
        loop {
            self.skip_trivia();
            if self.eat('}') {
                return Ok(());
            }
            let result = self.ident()?;
            self.skip_trivia();
            self.expect('=')?;
            self.skip_trivia();
            let op = self.ident()?;
            self.skip_trivia();
            self.expect('(')?;
            let mut args = Vec::new();
            loop {
                self.skip_trivia();
                if self.eat(')') {
                    break;
                }
                if !args.is_empty() {
                    self.expect(',')?;
                    self.skip_trivia();
                }
                args.push(self.ident()?);
            }
            self.skip_trivia();
            let mut attrs = Vec::new();
            if self.eat('{') {
                loop {
                    self.skip_trivia();
                    if self.eat('}') {
                        break;
                    }
                    let key = self.ident()?;
                    self.skip_trivia();
                    self.expect(':')?;
                    self.skip_trivia();
                    let value = self.attr_value()?;
                    self.skip_trivia();
                    self.expect(';')?;
                    attrs.push((key, value));
                }
                self.skip_trivia();
            }
            self.expect(';')?;
            program.body.push(Statement {
                result,
                op,
                args,
                attrs,
            });
        }
    }

    fn attr_value(&mut self) -> Result<AttrValue> {
        if self.peek() == Some('"') {
            return Ok(AttrValue::Str(self.string_lit()?));
        }
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_') {
                self.bump();
            } else {
                break;
            }
        }
        let raw = &self.src[start..self.pos];
        if raw.is_empty() {
            return Err(self.err("expected attribute value".to_string()));
        }
        if let Ok(i) = raw.parse::<i64>() {
            Ok(AttrValue::Int(i))
        } else if let Ok(x) = raw.parse::<f64>() {
            Ok(AttrValue::Float(x))
        } else {
            Err(self.err(format!("malformed attribute value `{}`", raw)))
        }
    }

    // Low-level cursor helpers

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.eat(c) {
            Ok(())
        } else {
            match self.peek() {
                Some(got) => Err(self.err(format!("expected `{}`, found `{}`", c, got))),
                None => Err(self.err(format!("expected `{}`, found end of input", c))),
            }
        }
    }

    /// Skip whitespace and `//` line comments.
    fn skip_trivia(&mut self) {
        loop {
            while matches!(self.peek(), Some(c) if c.is_whitespace()) {
                self.bump();
            }
            if self.src[self.pos..].starts_with("//") {
                while matches!(self.peek(), Some(c) if c != '\n') {
                    self.bump();
                }
            } else {
                return;
            }
        }
    }

    fn ident(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.err("expected identifier".to_string()));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn string_lit(&mut self) -> Result<String> {
        self.skip_trivia();
        self.expect('"')?;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '"' {
                let s = self.src[start..self.pos].to_string();
                self.bump();
                return Ok(s);
            }
            self.bump();
        }
        Err(self.err("unterminated string literal".to_string()))
    }

    /// The text up to (not including) the next `c`, without consuming `c`.
    fn until(&mut self, c: char) -> Result<&'a str> {
        let start = self.pos;
        while let Some(got) = self.peek() {
            if got == c {
                return Ok(&self.src[start..self.pos]);
            }
            self.bump();
        }
        Err(self.err(format!("expected `{}` before end of input", c)))
    }

    fn line(&self) -> usize {
        self.src[..self.pos].chars().filter(|&c| c == '\n').count() + 1
    }

    fn err(&self, reason: String) -> Error {
        Error::ProgramSyntax {
            line: self.line(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Dim;
    use crate::dtype::DType;

    const CHANNEL_SCALED: &str = r#"
@program { name: "dequantize_s_int8_channel_scaled"; }
@signature {
    input x: 2x3x4x5xqi8_X;
    input scale: 3xf32_X;
    input zero_point: 3xf32_X;
    output y: f32_X;
}
@body {
    y = dequantize(x, scale, zero_point) { axis: 1; };
}
"#;

    #[test]
    fn test_parse_full_program() {
        let p = Program::parse(CHANNEL_SCALED).unwrap();
        assert_eq!(p.name, "dequantize_s_int8_channel_scaled");
        assert_eq!(p.variant(), Some(ProgramVariant::Static));
        assert_eq!(p.inputs.len(), 3);
        assert_eq!(p.inputs[0].0, "x");
        assert_eq!(p.inputs[0].1.dtype, DType::QI8);
        assert_eq!(p.inputs[1].1.dims, vec![Dim::Fixed(3)]);
        assert_eq!(p.outputs.len(), 1);
        assert!(p.outputs[0].1.is_scalar());

        assert_eq!(p.body.len(), 1);
        let stmt = &p.body[0];
        assert_eq!(stmt.result, "y");
        assert_eq!(stmt.op, "dequantize");
        assert_eq!(stmt.args, vec!["x", "scale", "zero_point"]);
        assert_eq!(stmt.attr("axis").and_then(AttrValue::as_usize), Some(1));
        assert_eq!(p.input_index("zero_point"), Some(2));
    }

    #[test]
    fn test_parse_with_comments_and_no_meta() {
        let src = r#"
// signature only, no @program block
@signature {
    input x: 4xqi8_X; // data
    input s: f32_X;
    input z: f32_X;
    output y: f32_X;
}
@body { y = dequantize(x, s, z); }
"#;
        let p = Program::parse(src).unwrap();
        assert!(p.name.is_empty());
        assert_eq!(p.variant(), None);
        assert!(p.body[0].attrs.is_empty());
    }

    #[test]
    fn test_display_round_trip() {
        let p = Program::parse(CHANNEL_SCALED).unwrap();
        let p2 = Program::parse(&p.to_string()).unwrap();
        assert_eq!(p, p2);
    }

    #[test]
    fn test_missing_signature_rejected() {
        let err = Program::parse("@body { y = dequantize(x, s, z); }").unwrap_err();
        assert!(matches!(err, Error::ProgramSyntax { .. }));
    }

    #[test]
    fn test_syntax_error_carries_line() {
        let src = "@signature {\n    input x 4xqi8_X;\n}";
        match Program::parse(src).unwrap_err() {
            Error::ProgramSyntax { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_descriptor_in_signature() {
        let src = "@signature { input x: 2xblah_X; output y: f32_X; }";
        assert!(matches!(
            Program::parse(src).unwrap_err(),
            Error::InvalidDescriptor { .. }
        ));
    }

    #[test]
    fn test_attr_values() {
        let src = r#"
@signature { input x: 4xqi8_X; output y: f32_X; }
@body { y = dequantize(x) { axis: 0; eps: 0.5; mode: "strict"; }; }
"#;
        let p = Program::parse(src).unwrap();
        let stmt = &p.body[0];
        assert_eq!(stmt.attr("axis"), Some(&AttrValue::Int(0)));
        assert_eq!(stmt.attr("eps"), Some(&AttrValue::Float(0.5)));
        assert_eq!(stmt.attr("mode"), Some(&AttrValue::Str("strict".into())));
        assert_eq!(stmt.attr("missing"), None);
    }
}
