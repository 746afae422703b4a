//! Python extractor.
//!
//! No grammar is embedded: source is folded into logical lines (open
//! brackets, triple-quoted strings and trailing `\` join physical lines) and
//! declarations are recognised by anchored patterns. A line that matches
//! nothing is simply not classified, so this extractor has no parse-error
//! path.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::languages::Language;
use super::symbols::{
    CompilationUnit, FieldSymbol, FunctionSymbol, Param, PropertySymbol, Span, TypeKind,
    TypeSymbol, ValueSymbol, normalize_ws, push_unique,
};
use crate::error::{IndexError, Result};

static DEF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(async\s+)?def\s+([A-Za-z_]\w*)").expect("def pattern"));
static CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^class\s+([A-Za-z_]\w*)").expect("class pattern"));
static ASSIGN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_]\w*)\s*(?::\s*([^=]+?))?\s*=\s*(.*)$").expect("assign pattern")
});
static ANNOTATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_]\w*)\s*:\s*(\S.*)$").expect("annotation pattern"));
static CONST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^_*[A-Z][A-Z0-9_]*$").expect("const pattern"));
static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^import\s+(.+)$").expect("import pattern"));
static FROM_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^from\s+(\S+)\s+import\s+(.+)$").expect("from-import pattern"));
static RECEIVER_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(self|cls|super\(\))\.([A-Za-z_]\w*)\s*\(").expect("receiver call pattern")
});
static QUALIFIED_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z]\w*)\.([A-Za-z_]\w*)\s*\(").expect("qualified call pattern")
});
static BARE_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_]\w*)\s*\(").expect("bare call pattern"));
static TYPE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]\w*)\b").expect("type name pattern"));

/// Capitalised names from `typing` and the builtins; never a dependency.
const BUILTIN_TYPES: &[&str] = &[
    "Any", "Annotated", "AsyncGenerator", "AsyncIterator", "Awaitable", "Callable", "ClassVar",
    "Coroutine", "Dict", "Final", "FrozenSet", "Generator", "Generic", "Iterable", "Iterator",
    "List", "Literal", "Mapping", "MutableMapping", "MutableSequence", "Never", "NoReturn", "None",
    "Optional", "Protocol", "Self", "Sequence", "Set", "Tuple", "Type", "TypeVar", "Union", "True",
    "False",
];

const KEYWORDS: &[&str] = &[
    "and", "as", "assert", "await", "class", "def", "del", "elif", "else", "except", "for", "from",
    "if", "import", "in", "is", "lambda", "not", "or", "raise", "return", "while", "with", "yield",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Blank,
    Comment,
    Decorator,
    Code,
}

#[derive(Debug, Clone)]
struct LogicalLine {
    /// 1-based physical lines, inclusive.
    start: usize,
    end: usize,
    indent: usize,
    kind: LineKind,
    /// Code with comments stripped, physical pieces joined by spaces.
    code: String,
}

#[derive(Default)]
struct ScanState {
    triple: Option<char>,
    depth: usize,
}

/// Scan one physical line. Returns the code outside comments and whether a
/// trailing `\` continues the line.
fn scan_line(line: &str, state: &mut ScanState) -> (String, bool) {
    let chars: Vec<char> = line.chars().collect();
    let mut code = String::with_capacity(line.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = state.triple {
            if c == '\\' {
                code.extend(chars[i..].iter().take(2));
                i += 2;
                continue;
            }
            if c == q && chars.get(i + 1) == Some(&q) && chars.get(i + 2) == Some(&q) {
                code.extend([q, q, q]);
                state.triple = None;
                i += 3;
                continue;
            }
            code.push(c);
            i += 1;
            continue;
        }
        match c {
            '#' => break,
            '\'' | '"' => {
                if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                    code.extend([c, c, c]);
                    state.triple = Some(c);
                    i += 3;
                    continue;
                }
                code.push(c);
                i += 1;
                while i < chars.len() {
                    let d = chars[i];
                    code.push(d);
                    i += 1;
                    if d == '\\' {
                        if let Some(&escaped) = chars.get(i) {
                            code.push(escaped);
                            i += 1;
                        }
                    } else if d == c {
                        break;
                    }
                }
                continue;
            }
            '(' | '[' | '{' => state.depth += 1,
            ')' | ']' | '}' => state.depth = state.depth.saturating_sub(1),
            _ => {}
        }
        code.push(c);
        i += 1;
    }
    let continues = state.triple.is_none() && code.trim_end().ends_with('\\');
    (code, continues)
}

fn indent_of(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width = (width / 8 + 1) * 8,
            _ => break,
        }
    }
    width
}

fn logical_lines(physical: &[&str]) -> Vec<LogicalLine> {
    let mut lines = Vec::new();
    let mut state = ScanState::default();
    let mut i = 0;
    while i < physical.len() {
        let start = i;
        let mut parts = Vec::new();
        loop {
            let (code, continues) = scan_line(physical[i], &mut state);
            let piece = code.trim();
            let piece = if continues {
                piece.trim_end_matches('\\').trim_end()
            } else {
                piece
            };
            if !piece.is_empty() {
                parts.push(piece.to_string());
            }
            let open = state.triple.is_some() || state.depth > 0 || continues;
            if !open || i + 1 >= physical.len() {
                break;
            }
            i += 1;
        }
        let code = parts.join(" ");
        let first = physical[start].trim_start();
        let kind = if code.is_empty() {
            if first.starts_with('#') {
                LineKind::Comment
            } else {
                LineKind::Blank
            }
        } else if code.starts_with('@') {
            LineKind::Decorator
        } else {
            LineKind::Code
        };
        lines.push(LogicalLine {
            start: start + 1,
            end: i + 1,
            indent: indent_of(physical[start]),
            kind,
            code,
        });
        i += 1;
    }
    lines
}

/// Docstring carried by a logical line that is a bare triple-quoted string.
fn docstring_of(raw: &str) -> Option<String> {
    let text = raw.trim_start();
    let prefix = text
        .chars()
        .take_while(|c| "rRuUbBfF".contains(*c))
        .count();
    if prefix > 2 {
        return None;
    }
    let rest = &text[prefix..];
    let quote = ["\"\"\"", "'''"].into_iter().find(|q| rest.starts_with(q))?;
    let body = &rest[3..];
    let close = body.find(quote)?;
    Some(clean_docstring(&body[..close]))
}

/// Trim the first line and dedent the rest by their common indentation.
fn clean_docstring(body: &str) -> String {
    let mut lines = body.lines();
    let first = lines.next().unwrap_or("").trim().to_string();
    let rest: Vec<&str> = lines.collect();
    let margin = rest
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| indent_of(l))
        .min()
        .unwrap_or(0);
    let mut out = vec![first];
    for line in rest {
        let cut = line
            .char_indices()
            .take_while(|(i, c)| *i < margin && c.is_whitespace())
            .count();
        out.push(line.chars().skip(cut).collect::<String>().trim_end().to_string());
    }
    out.join("\n").trim().to_string()
}

/// Split `text` on commas outside brackets and string literals.
fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut current = String::new();
    for c in text.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Byte offset of the bracket closing the one opened at `open`.
fn matching_close(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in text[open..].char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Position of the first `ch` outside brackets.
fn find_top_level(text: &str, ch: char) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if c == ch && depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

struct DefHeader {
    is_async: bool,
    name: String,
    params: String,
    returns: Option<String>,
}

fn parse_def(code: &str) -> Option<DefHeader> {
    let caps = DEF_RE.captures(code)?;
    let name = caps.get(2)?.as_str().to_string();
    let after_name = caps.get(0)?.end();
    let open = after_name + code[after_name..].find('(')?;
    let close = matching_close(code, open)?;
    let params = code[open + 1..close].to_string();
    let tail = code[close + 1..].trim_start();
    let returns = tail.strip_prefix("->").map(|rest| {
        let rest = rest.trim_start();
        let end = find_top_level(rest, ':').unwrap_or(rest.len());
        rest[..end].trim().to_string()
    });
    Some(DefHeader {
        is_async: caps.get(1).is_some(),
        name,
        params,
        returns,
    })
}

struct ClassHeader {
    name: String,
    args: Vec<String>,
}

fn parse_class(code: &str) -> Option<ClassHeader> {
    let caps = CLASS_RE.captures(code)?;
    let name = caps.get(1)?.as_str().to_string();
    let rest = code[caps.get(0)?.end()..].trim_start();
    // PEP 695 type parameters.
    let rest = match rest.strip_prefix('[') {
        Some(_) => matching_close(rest, 0).map(|c| rest[c + 1..].trim_start()).unwrap_or(rest),
        None => rest,
    };
    let args = if rest.starts_with('(') {
        let close = matching_close(rest, 0)?;
        split_top_level(&rest[1..close])
    } else {
        Vec::new()
    };
    Some(ClassHeader { name, args })
}

fn parse_params(text: &str) -> Vec<Param> {
    split_top_level(text)
        .into_iter()
        .filter(|p| !p.is_empty() && p != "/" && p != "*")
        .map(|p| {
            let (left, default) = match find_top_level(&p, '=') {
                Some(i) => (p[..i].trim().to_string(), Some(normalize_ws(&p[i + 1..]))),
                None => (p.clone(), None),
            };
            let (name, type_name) = match left.split_once(':') {
                Some((n, t)) => (n.trim().to_string(), normalize_ws(t)),
                None => (left.trim().to_string(), String::new()),
            };
            Param {
                variadic: name.starts_with('*'),
                name,
                type_name,
                default,
            }
        })
        .collect()
}

/// Capitalised names in an annotation, minus builtins.
fn annotation_types(annotation: &str, out: &mut Vec<String>) {
    for caps in TYPE_NAME_RE.captures_iter(annotation) {
        let name = &caps[1];
        if !BUILTIN_TYPES.contains(&name) {
            push_unique(out, name);
        }
    }
}

/// `Wrapper[Inner]` → `Inner`; plain bases pass through.
fn strip_generic(base: &str, out: &mut Vec<String>) {
    match (base.find('['), base.rfind(']')) {
        (Some(open), Some(close)) if open < close => {
            for inner in split_top_level(&base[open + 1..close]) {
                strip_generic(&inner, out);
            }
        }
        _ => {
            let base = base.trim().trim_matches(['\'', '"']);
            let last = base.rsplit('.').next().unwrap_or(base);
            if last.chars().next().is_some_and(char::is_uppercase) && !BUILTIN_TYPES.contains(&last) {
                push_unique(out, base);
            }
        }
    }
}

fn scan_calls(code: &str, out: &mut Vec<String>) {
    for caps in RECEIVER_CALL_RE.captures_iter(code) {
        push_unique(out, format!("{}.{}", &caps[1], &caps[2]));
    }
    for caps in QUALIFIED_CALL_RE.captures_iter(code) {
        let Some(whole) = caps.get(0) else { continue };
        if code[..whole.start()].ends_with('.') {
            continue;
        }
        push_unique(out, format!("{}.{}", &caps[1], &caps[2]));
    }
    for caps in BARE_CALL_RE.captures_iter(code) {
        let Some(name) = caps.get(1) else { continue };
        let before = &code[..name.start()];
        if before.ends_with('.') || before.ends_with("def ") || before.ends_with("class ") {
            continue;
        }
        let name = name.as_str();
        if KEYWORDS.contains(&name) || name == "self" || name == "cls" || name == "super" {
            continue;
        }
        push_unique(out, name);
    }
}

fn is_const_name(name: &str) -> bool {
    CONST_RE.is_match(name)
}

/// Which accessor a decorated method provides for a property.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Accessor {
    Getter,
    Setter,
    Deleter,
}

fn accessor_of(decorators: &[String]) -> Option<(Accessor, Option<String>)> {
    for dec in decorators {
        match dec.as_str() {
            "property" | "cached_property" | "functools.cached_property" => {
                return Some((Accessor::Getter, None));
            }
            _ => {}
        }
        if let Some(prop) = dec.strip_suffix(".setter") {
            return Some((Accessor::Setter, Some(prop.to_string())));
        }
        if let Some(prop) = dec.strip_suffix(".deleter") {
            return Some((Accessor::Deleter, Some(prop.to_string())));
        }
    }
    None
}

pub struct PythonExtractor;

impl PythonExtractor {
    pub fn extract_file(path: &Path) -> Result<CompilationUnit> {
        let bytes = fs::read(path).map_err(|e| IndexError::io(path, e))?;
        Ok(Self::extract_source(path, &String::from_utf8_lossy(&bytes)))
    }

    pub fn extract_source(path: &Path, source: &str) -> CompilationUnit {
        let physical: Vec<&str> = source.lines().collect();
        let scanner = Scanner {
            lines: logical_lines(&physical),
            physical,
            file_path: path.to_string_lossy().replace('\\', "/"),
        };
        let mut unit = CompilationUnit::new(Language::Python, scanner.file_path.clone());
        unit.package = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();
        scanner.module(&mut unit);
        unit
    }
}

struct Scanner<'a> {
    physical: Vec<&'a str>,
    lines: Vec<LogicalLine>,
    file_path: String,
}

impl Scanner<'_> {
    fn raw(&self, line: &LogicalLine) -> String {
        self.physical[line.start - 1..line.end].join("\n")
    }

    fn excerpt(&self, start: usize, end: usize) -> String {
        self.physical[start - 1..end.min(self.physical.len())].join("\n")
    }

    /// Index of the last code line inside the block opened at `idx`.
    fn block_end(&self, idx: usize) -> usize {
        let indent = self.lines[idx].indent;
        let mut last = idx;
        for (j, line) in self.lines.iter().enumerate().skip(idx + 1) {
            match line.kind {
                LineKind::Blank | LineKind::Comment => continue,
                _ if line.indent <= indent => break,
                _ => last = j,
            }
        }
        last
    }

    /// First statement of a block when it is a docstring.
    fn docstring_after(&self, idx: usize, end: usize) -> Option<(String, usize)> {
        let indent = self.lines[idx].indent;
        let (j, line) = self
            .lines
            .iter()
            .enumerate()
            .take(end + 1)
            .skip(idx + 1)
            .find(|(_, l)| !matches!(l.kind, LineKind::Blank | LineKind::Comment))?;
        if line.indent <= indent {
            return None;
        }
        docstring_of(&self.raw(line)).map(|doc| (doc, j))
    }

    fn module(&self, unit: &mut CompilationUnit) {
        if let Some(first) = self
            .lines
            .iter()
            .find(|l| !matches!(l.kind, LineKind::Blank | LineKind::Comment))
        {
            if first.indent == 0 {
                if let Some(doc) = docstring_of(&self.raw(first)) {
                    unit.doc = doc;
                    unit.doc_file = self.file_path.clone();
                    unit.doc_span = Span::new(first.start, first.end);
                }
            }
        }

        let mut decorators: Vec<(String, usize)> = Vec::new();
        let mut i = 0;
        while i < self.lines.len() {
            let line = &self.lines[i];
            if matches!(line.kind, LineKind::Blank | LineKind::Comment) || line.indent > 0 {
                i += 1;
                continue;
            }
            if line.kind == LineKind::Decorator {
                decorators.push((decorator_name(&line.code), line.start));
                i += 1;
                continue;
            }
            let decs = std::mem::take(&mut decorators);
            if let Some(header) = parse_class(&line.code) {
                let end = self.block_end(i);
                unit.types.push(self.class(i, end, header, decs));
                i = end + 1;
                continue;
            }
            if let Some(header) = parse_def(&line.code) {
                let end = self.block_end(i);
                unit.functions.push(self.function(i, end, header, decs, None));
                i = end + 1;
                continue;
            }
            if !self.import(&line.code, unit) {
                if let Some(value) = self.value(line) {
                    if value.is_const {
                        unit.constants.push(value);
                    } else {
                        unit.variables.push(value);
                    }
                }
            }
            i += 1;
        }
    }

    fn import(&self, code: &str, unit: &mut CompilationUnit) -> bool {
        if let Some(caps) = FROM_IMPORT_RE.captures(code) {
            let module = &caps[1];
            let names = caps[2].trim().trim_start_matches('(').trim_end_matches(')');
            for name in split_top_level(names) {
                let (name, alias) = match name.split_once(" as ") {
                    Some((n, a)) => (n.trim().to_string(), a.trim().to_string()),
                    None => (name.trim().to_string(), name.trim().to_string()),
                };
                if name.is_empty() {
                    continue;
                }
                let target = if module.chars().all(|c| c == '.') {
                    format!("{module}{name}")
                } else {
                    format!("{module}.{name}")
                };
                unit.imports.add(alias, target);
            }
            return true;
        }
        if let Some(caps) = IMPORT_RE.captures(code) {
            for name in split_top_level(&caps[1]) {
                match name.split_once(" as ") {
                    Some((target, alias)) => unit.imports.add(alias.trim(), target.trim()),
                    None => unit.imports.add(name.trim(), name.trim()),
                }
            }
            return true;
        }
        false
    }

    fn value(&self, line: &LogicalLine) -> Option<ValueSymbol> {
        let (name, type_name, value) = if let Some(caps) = ASSIGN_RE.captures(&line.code) {
            let value = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            if value.starts_with('=') {
                return None;
            }
            (
                caps[1].to_string(),
                caps.get(2).map(|m| normalize_ws(m.as_str())).unwrap_or_default(),
                normalize_ws(value),
            )
        } else if let Some(caps) = ANNOTATION_RE.captures(&line.code) {
            (caps[1].to_string(), normalize_ws(&caps[2]), String::new())
        } else {
            return None;
        };
        if KEYWORDS.contains(&name.as_str()) {
            return None;
        }
        let mut signature = name.clone();
        if !type_name.is_empty() {
            signature.push_str(&format!(": {type_name}"));
        }
        if !value.is_empty() {
            signature.push_str(&format!(" = {value}"));
        }
        Some(ValueSymbol {
            is_const: is_const_name(&name),
            name,
            file_path: self.file_path.clone(),
            span: Span::new(line.start, line.end),
            signature,
            code: self.excerpt(line.start, line.end),
            type_name,
            value,
            ..Default::default()
        })
    }

    fn function(
        &self,
        idx: usize,
        end: usize,
        header: DefHeader,
        decorators: Vec<(String, usize)>,
        owner: Option<&str>,
    ) -> FunctionSymbol {
        let line = &self.lines[idx];
        let start_line = decorators.first().map(|(_, l)| *l).unwrap_or(line.start);
        let end_line = self.lines[end].end;
        let doc = self.docstring_after(idx, end);
        let doc_idx = doc.as_ref().map(|(_, j)| *j);

        let mut calls = Vec::new();
        for j in idx + 1..=end {
            if Some(j) == doc_idx || self.lines[j].kind != LineKind::Code {
                continue;
            }
            scan_calls(&self.lines[j].code, &mut calls);
        }

        let params = parse_params(&header.params);
        let mut type_deps = Vec::new();
        for param in &params {
            annotation_types(&param.type_name, &mut type_deps);
        }
        if let Some(ret) = &header.returns {
            annotation_types(ret, &mut type_deps);
        }

        let mut signature = format!(
            "{}def {}({})",
            if header.is_async { "async " } else { "" },
            header.name,
            normalize_ws(&header.params).trim_end_matches(',').trim()
        );
        if let Some(ret) = &header.returns {
            signature.push_str(&format!(" -> {ret}"));
        }

        let decorators: Vec<String> = decorators.into_iter().map(|(d, _)| d).collect();
        FunctionSymbol {
            name: header.name,
            file_path: self.file_path.clone(),
            span: Span::new(start_line, end_line).with_name_lines(line.start, line.start),
            signature,
            doc: doc.map(|(d, _)| d).unwrap_or_default(),
            code: self.excerpt(start_line, end_line),
            receiver: owner.map(str::to_string),
            params,
            returns: header.returns.into_iter().collect(),
            is_static: decorators.iter().any(|d| d == "staticmethod"),
            is_abstract: decorators.iter().any(|d| d.ends_with("abstractmethod")),
            is_async: header.is_async,
            decorators,
            calls,
            type_deps,
            ..Default::default()
        }
    }

    fn class(
        &self,
        idx: usize,
        end: usize,
        header: ClassHeader,
        decorators: Vec<(String, usize)>,
    ) -> TypeSymbol {
        let line = &self.lines[idx];
        let start_line = decorators.first().map(|(_, l)| *l).unwrap_or(line.start);
        let end_line = self.lines[end].end;

        let mut bases = Vec::new();
        let mut metaclass = None;
        for arg in &header.args {
            match arg.split_once('=') {
                Some((key, value)) if key.trim() == "metaclass" => {
                    metaclass = Some(value.trim().to_string());
                }
                Some(_) => {}
                None if arg.starts_with('*') => {}
                None => bases.push(arg.clone()),
            }
        }

        let signature = if header.args.is_empty() {
            format!("class {}", header.name)
        } else {
            format!("class {}({})", header.name, header.args.join(", "))
        };
        let doc = self.docstring_after(idx, end);
        let mut ty = TypeSymbol {
            name: header.name.clone(),
            kind: TypeKind::Class,
            file_path: self.file_path.clone(),
            span: Span::new(start_line, end_line).with_name_lines(line.start, line.start),
            signature,
            doc: doc.as_ref().map(|(d, _)| d.clone()).unwrap_or_default(),
            code: self.excerpt(start_line, end_line),
            bases,
            decorators: decorators.into_iter().map(|(d, _)| d).collect(),
            metaclass,
            ..Default::default()
        };
        self.class_body(idx, end, doc.map(|(_, j)| j), &mut ty);

        let mut deps = Vec::new();
        for base in &ty.bases {
            strip_generic(base, &mut deps);
        }
        if let Some(meta) = &ty.metaclass {
            push_unique(&mut deps, meta.clone());
        }
        for method in &ty.methods {
            for dep in &method.type_deps {
                push_unique(&mut deps, dep.clone());
            }
        }
        deps.retain(|d| d != &ty.name);
        ty.dependencies = deps;
        ty
    }

    fn class_body(&self, idx: usize, end: usize, doc_idx: Option<usize>, ty: &mut TypeSymbol) {
        let Some(body_indent) = self.lines[idx + 1..=end]
            .iter()
            .find(|l| matches!(l.kind, LineKind::Code | LineKind::Decorator))
            .map(|l| l.indent)
        else {
            return;
        };

        let mut decorators: Vec<(String, usize)> = Vec::new();
        let mut j = idx + 1;
        while j <= end {
            let line = &self.lines[j];
            if matches!(line.kind, LineKind::Blank | LineKind::Comment)
                || line.indent != body_indent
                || Some(j) == doc_idx
            {
                j += 1;
                continue;
            }
            if line.kind == LineKind::Decorator {
                decorators.push((decorator_name(&line.code), line.start));
                j += 1;
                continue;
            }
            let decs = std::mem::take(&mut decorators);
            if let Some(header) = parse_def(&line.code) {
                let member_end = self.block_end(j);
                let names: Vec<String> = decs.iter().map(|(d, _)| d.clone()).collect();
                let func = self.function(j, member_end, header, decs, Some(&ty.name));
                match accessor_of(&names) {
                    Some((accessor, target)) => {
                        let name = target.unwrap_or_else(|| func.name.clone());
                        self.merge_property(ty, name, accessor, func);
                    }
                    None => ty.methods.push(func),
                }
                j = member_end + 1;
                continue;
            }
            if parse_class(&line.code).is_some() {
                j = self.block_end(j) + 1;
                continue;
            }
            if let Some(value) = self.value(line) {
                ty.fields.push(FieldSymbol {
                    name: value.name,
                    type_name: value.type_name,
                    line: line.start,
                    ..Default::default()
                });
            }
            j += 1;
        }
    }

    fn merge_property(&self, ty: &mut TypeSymbol, name: String, accessor: Accessor, func: FunctionSymbol) {
        let idx = match ty.properties.iter().position(|p| p.name == name) {
            Some(idx) => idx,
            None => {
                ty.properties.push(PropertySymbol {
                    name: name.clone(),
                    file_path: self.file_path.clone(),
                    span: func.span,
                    signature: format!("@property {name}"),
                    ..Default::default()
                });
                ty.properties.len() - 1
            }
        };
        let prop = &mut ty.properties[idx];
        prop.span.start_line = prop.span.start_line.min(func.span.start_line);
        prop.span.end_line = prop.span.end_line.max(func.span.end_line);
        match accessor {
            Accessor::Getter => {
                prop.has_getter = true;
                prop.span.name_start = func.span.name_start;
                prop.span.name_end = func.span.name_end;
                prop.doc = func.doc;
                if let Some(ret) = func.returns.first() {
                    prop.type_name = ret.clone();
                    prop.signature = format!("@property {name} -> {ret}");
                }
            }
            Accessor::Setter => prop.has_setter = true,
            Accessor::Deleter => prop.has_deleter = true,
        }
        prop.code = self.excerpt(prop.span.start_line, prop.span.end_line);
    }
}

/// `@app.route("/x", methods=["GET"])` → `app.route("/x", methods=["GET"])`.
fn decorator_name(code: &str) -> String {
    normalize_ws(code.trim_start_matches('@'))
}
