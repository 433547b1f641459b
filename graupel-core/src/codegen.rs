use std::collections::HashMap;

use crate::analyzer::{Analysis, Kind, Mode};
use crate::error::{Error, Result};
use crate::parser::{Among, Cmd, CmdSpan, Expr, IntOp, SourceUnit, StrArg};

/// Runtime string wrapper emitted once per module. Cursor motion, literal
/// matching and buffer edits all consult `direction` so the same helper
/// code serves forward and backward routines.
const STRING_RUNTIME: &str = r#"class _String:

  def __init__(self, s):
    self.chars = list(s)
    self.cursor = 0
    self.limit = len(self.chars)
    self.direction = 1

  def __str__(self):
    return ''.join(self.chars)

  def __len__(self):
    return len(self.chars)

  def get_range(self, start, stop):
    if self.direction == 1:
      return self.chars[start:stop]
    return self.chars[stop:start]

  def set_range(self, start, stop, chars):
    if self.direction == 1:
      self.chars[start:stop] = chars
    else:
      self.chars[stop:start] = chars
    change = self.direction * (len(chars) - (stop - start))
    if self.direction == 1:
      if self.cursor >= stop:
        self.cursor += change
        self.limit += change
    else:
      if self.cursor > start:
        self.cursor += change
      if self.limit > start:
        self.limit += change
    return True

  def insert(self, chars):
    self.chars[self.cursor:self.cursor] = chars
    if self.direction == 1:
      self.cursor += len(chars)
      self.limit += len(chars)
    return True

  def attach(self, chars):
    self.chars[self.cursor:self.cursor] = chars
    if self.direction == 1:
      self.limit += len(chars)
    else:
      self.cursor += len(chars)
    return True

  def set_chars(self, chars):
    self.chars = list(chars)
    if self.direction == 1:
      self.cursor = 0
      self.limit = len(self.chars)
    else:
      self.cursor = len(self.chars)
      self.limit = 0
    return True

  def starts_with(self, chars):
    n = len(chars)
    window = self.get_range(self.cursor, self.limit)[::self.direction][:n]
    if window != list(chars)[::self.direction]:
      return False
    self.cursor += n * self.direction
    return True

  def hop(self, n):
    if n < 0 or len(self.get_range(self.cursor, self.limit)) < n:
      return False
    self.cursor += n * self.direction
    return True

  def to_mark(self, mark):
    if self.direction == 1:
      if self.cursor > mark or self.limit < mark:
        return False
    else:
      if self.cursor < mark or self.limit > mark:
        return False
    self.cursor = mark
    return True

  def in_grouping(self, group):
    if self.cursor == self.limit:
      return False
    if self.direction == 1:
      c = self.chars[self.cursor]
    else:
      c = self.chars[self.cursor - 1]
    if c not in group:
      return False
    self.cursor += self.direction
    return True

  def out_grouping(self, group):
    if self.cursor == self.limit:
      return False
    if self.direction == 1:
      c = self.chars[self.cursor]
    else:
      c = self.chars[self.cursor - 1]
    if c in group:
      return False
    self.cursor += self.direction
    return True
"#;

/// Snapshot and among-probe helpers shared by every generated routine,
/// emitted at class level inside `_Program`.
const PROGRAM_HELPERS: &str = r#"  def _mark(self, s):
    return (s.cursor, s.limit, self.left, self.right, list(s.chars),
            len(s.chars) - s.cursor)

  def _reset(self, s, mark):
    s.cursor = mark[0]
    s.limit = mark[1]
    self.left = mark[2]
    self.right = mark[3]
    s.chars[:] = mark[4]

  def _retreat(self, s, mark):
    if s.direction == 1:
      s.cursor = mark[0]
    else:
      s.cursor = len(s.chars) - mark[5]

  def _find_among(self, s, table):
    for chars, routine, arm in table:
      cursor = s.cursor
      if s.starts_with(chars) and (routine is None or getattr(self, routine)(s)):
        return arm
      s.cursor = cursor
    return -1
"#;

pub fn generate(unit: &SourceUnit, analysis: &Analysis) -> Result<String> {
    let mut codegen = Codegen {
        analysis,
        var_index: 0,
        table_index: HashMap::new(),
        module_code: vec![],
        class_code: vec![],
    };
    codegen.run(unit)
}

struct Codegen<'a> {
    analysis: &'a Analysis,
    var_index: usize,
    /// (among node id, direction) -> emitted `_a_N` table number.
    table_index: HashMap<(usize, Mode), usize>,
    module_code: Vec<String>,
    class_code: Vec<String>,
}

impl<'a> Codegen<'a> {
    fn run(&mut self, unit: &SourceUnit) -> Result<String> {
        for def in &unit.routine_defs {
            let info = self
                .analysis
                .routines
                .get(&def.name.name)
                .ok_or_else(|| Error::Codegen {
                    message: format!("routine '{}' has no analysis entry", def.name.name),
                })?
                .clone();
            for &mode in &info.modes {
                let method = self.method_name(&def.name.name, mode);
                let body = self.gen_cmd(&def.body, mode)?;
                let mut code = format!("def {method}(self, s):\n  r = True\n");
                code.push_str(&indent(&body, "  "));
                code.push_str("\n  return r");
                self.class_code.push(code);
            }
        }

        let mut out = String::new();
        out.push_str("#!/usr/bin/env python\n");
        out.push_str("# Generated by graupel. Do not edit.\n\n");
        out.push_str("MAXINT = 2147483647\n");
        out.push_str("MININT = -2147483648\n\n");
        out.push_str(STRING_RUNTIME);
        out.push('\n');

        for (name, chars) in &self.analysis.groupings {
            let text: String = chars.iter().collect();
            out.push_str(&format!("_g_{name} = frozenset({})\n", py_str(&text)));
        }
        if !self.analysis.groupings.is_empty() {
            out.push('\n');
        }

        for line in &self.module_code {
            out.push_str(line);
            out.push('\n');
        }
        if !self.module_code.is_empty() {
            out.push('\n');
        }

        out.push_str("class _Program:\n\n");
        out.push_str("  def __init__(self):\n");
        out.push_str("    self.left = 0\n");
        out.push_str("    self.right = 0\n");
        for name in &unit.integers {
            out.push_str(&format!("    self.i_{} = 0\n", name.name));
        }
        for name in &unit.booleans {
            out.push_str(&format!("    self.b_{} = False\n", name.name));
        }
        for name in &unit.strings {
            out.push_str(&format!("    self.s_{} = _String('')\n", name.name));
        }
        out.push('\n');
        out.push_str(PROGRAM_HELPERS);
        for code in &self.class_code {
            out.push('\n');
            out.push_str(&indent(code, "  "));
            out.push('\n');
        }

        for name in &self.analysis.externals {
            let method = self.method_name(name, Mode::Forward);
            out.push('\n');
            out.push_str(&format!(
                "def {name}(word):\n  s = _String(word)\n  _Program().{method}(s)\n  return str(s)\n"
            ));
        }
        Ok(out)
    }

    fn next_var(&mut self) -> String {
        let var = format!("var{}", self.var_index);
        self.var_index += 1;
        var
    }

    /// Method name of a routine when called in the given direction. Only
    /// dual-form routines get a `_bw` twin.
    fn method_name(&self, name: &str, mode: Mode) -> String {
        match self.analysis.routines.get(name) {
            Some(info) if info.is_dual() && mode == Mode::Backward => format!("r_{name}_bw"),
            _ => format!("r_{name}"),
        }
    }

    /// Number of the emitted probe table for an among in one direction,
    /// emitting the table on first use.
    fn table(&mut self, among_id: usize, mode: Mode) -> Result<usize> {
        if let Some(&index) = self.table_index.get(&(among_id, mode)) {
            return Ok(index);
        }
        let compiled =
            self.analysis
                .amongs
                .get(&(among_id, mode))
                .ok_or_else(|| Error::Codegen {
                    message: format!("among {among_id} was not compiled for {mode:?}"),
                })?;
        let index = self.table_index.len() + 1;
        self.table_index.insert((among_id, mode), index);
        let mut entries = String::new();
        for entry in &compiled.entries {
            let routine = match &entry.routine {
                Some(name) => format!("'{}'", self.method_name(name, mode)),
                None => "None".to_string(),
            };
            entries.push_str(&format!(
                "({}, {}, {}), ",
                py_str(&entry.text),
                routine,
                entry.arm
            ));
        }
        self.module_code
            .push(format!("_a_{index} = ({entries})"));
        Ok(index)
    }

    fn gen_cmd(&mut self, cmd: &CmdSpan, mode: Mode) -> Result<String> {
        match &cmd.cmd {
            Cmd::Literal(text) => Ok(format!("r = s.starts_with({})", py_str(text))),
            Cmd::NameRef(name) => match self.analysis.kinds.get(&name.name) {
                Some(Kind::Routine) => {
                    Ok(format!("r = self.{}(s)", self.method_name(&name.name, mode)))
                }
                Some(Kind::Grouping) => Ok(format!("r = s.in_grouping(_g_{})", name.name)),
                Some(Kind::Boolean) => Ok(format!("r = self.b_{}", name.name)),
                Some(Kind::String) => {
                    Ok(format!("r = s.starts_with(self.s_{}.chars)", name.name))
                }
                _ => Err(Error::Codegen {
                    message: format!("unresolved name '{}'", name.name),
                }),
            },
            Cmd::Sequence(items) => {
                let mut blocks = vec![];
                for item in items {
                    blocks.push(self.gen_cmd(item, mode)?);
                }
                Ok(chain(blocks))
            }
            Cmd::Or(branches) => {
                let mark = self.next_var();
                let mut code = format!("{mark} = self._mark(s)\n");
                code.push_str(&self.gen_cmd(&branches[0], mode)?);
                let mut prefix = String::new();
                for branch in &branches[1..] {
                    code.push_str(&format!("\n{prefix}if not r:\n"));
                    prefix.push_str("  ");
                    let block = format!(
                        "self._reset(s, {mark})\n{}",
                        self.gen_cmd(branch, mode)?
                    );
                    code.push_str(&indent(&block, &prefix));
                }
                code.push_str(&format!(
                    "\n{prefix}if not r:\n{prefix}  self._reset(s, {mark})"
                ));
                Ok(code)
            }
            Cmd::And(parts) => {
                let mark = self.next_var();
                let mut code = format!("{mark} = self._mark(s)\n");
                code.push_str(&self.gen_cmd(&parts[0], mode)?);
                let mut prefix = String::new();
                for part in &parts[1..] {
                    code.push_str(&format!("\n{prefix}if r:\n"));
                    prefix.push_str("  ");
                    let block = format!(
                        "self._retreat(s, {mark})\n{}",
                        self.gen_cmd(part, mode)?
                    );
                    code.push_str(&indent(&block, &prefix));
                }
                Ok(code)
            }
            Cmd::Not(inner) => {
                let mark = self.next_var();
                let body = self.gen_cmd(inner, mode)?;
                Ok(format!(
                    "{mark} = self._mark(s)\n{body}\nself._reset(s, {mark})\nr = not r"
                ))
            }
            Cmd::Test(inner) => {
                let mark = self.next_var();
                let body = self.gen_cmd(inner, mode)?;
                Ok(format!(
                    "{mark} = self._mark(s)\n{body}\nif r:\n  self._retreat(s, {mark})\nelse:\n  self._reset(s, {mark})"
                ))
            }
            Cmd::Try(inner) => {
                let mark = self.next_var();
                let body = self.gen_cmd(inner, mode)?;
                Ok(format!(
                    "{mark} = self._mark(s)\n{body}\nif not r:\n  self._reset(s, {mark})\n  r = True"
                ))
            }
            Cmd::Do(inner) => {
                let mark = self.next_var();
                let body = self.gen_cmd(inner, mode)?;
                Ok(format!(
                    "{mark} = self._mark(s)\n{body}\nif r:\n  self._retreat(s, {mark})\nelse:\n  self._reset(s, {mark})\nr = True"
                ))
            }
            Cmd::Fail(inner) => {
                let body = self.gen_cmd(inner, mode)?;
                Ok(format!("{body}\nr = False"))
            }
            Cmd::Repeat(inner) => {
                let mark = self.next_var();
                let body = indent(&self.gen_cmd(inner, mode)?, "  ");
                Ok(format!(
                    "while True:\n  {mark} = self._mark(s)\n{body}\n  if not r:\n    self._reset(s, {mark})\n    break\nr = True"
                ))
            }
            Cmd::Goto(inner) => {
                let mark = self.next_var();
                let body = indent(&self.gen_cmd(inner, mode)?, "  ");
                Ok(format!(
                    "while True:\n  {mark} = self._mark(s)\n{body}\n  if r:\n    self._retreat(s, {mark})\n    break\n  self._reset(s, {mark})\n  if s.cursor == s.limit:\n    break\n  s.cursor += s.direction"
                ))
            }
            Cmd::GoPast(inner) => {
                let mark = self.next_var();
                let body = indent(&self.gen_cmd(inner, mode)?, "  ");
                Ok(format!(
                    "while True:\n  {mark} = self._mark(s)\n{body}\n  if r:\n    break\n  self._reset(s, {mark})\n  if s.cursor == s.limit:\n    break\n  s.cursor += s.direction"
                ))
            }
            Cmd::Loop(count, inner) => {
                let var = self.next_var();
                let count = gen_expr(count);
                let body = indent(&self.gen_cmd(inner, mode)?, "  ");
                Ok(format!(
                    "r = True\nfor {var} in range({count}):\n{body}\n  if not r:\n    break"
                ))
            }
            Cmd::AtLeast(count, inner) => {
                let var = self.next_var();
                let count_code = gen_expr(count);
                let loop_body = indent(&self.gen_cmd(inner, mode)?, "  ");
                let loop_code = format!(
                    "r = True\nfor {var} in range({count_code}):\n{loop_body}\n  if not r:\n    break"
                );
                let mark = self.next_var();
                let repeat_body = indent(&self.gen_cmd(inner, mode)?, "  ");
                let repeat_code = format!(
                    "while True:\n  {mark} = self._mark(s)\n{repeat_body}\n  if not r:\n    self._reset(s, {mark})\n    break\nr = True"
                );
                Ok(chain(vec![loop_code, repeat_code]))
            }
            Cmd::Backwards(inner) => {
                let body = self.gen_cmd(inner, Mode::Backward)?;
                if mode == Mode::Backward {
                    // already matching right to left; flat re-entry
                    return Ok(body);
                }
                let cursor = self.next_var();
                let limit = self.next_var();
                Ok(format!(
                    "{cursor} = s.cursor\n{limit} = len(s) - s.limit\ns.direction = -1\ns.cursor, s.limit = s.limit, s.cursor\n{body}\ns.direction = 1\ns.cursor = {cursor}\ns.limit = len(s) - {limit}"
                ))
            }
            Cmd::SetLimit(bound, body) => {
                let cursor = self.next_var();
                let limit = self.next_var();
                let bound_code = self.gen_cmd(bound, mode)?;
                let body_code = indent(&self.gen_cmd(body, mode)?, "  ");
                Ok(format!(
                    "{cursor} = s.cursor\n{limit} = len(s) - s.limit\n{bound_code}\nif r:\n  s.limit = s.cursor\n  s.cursor = {cursor}\n{body_code}\n  s.limit = len(s) - {limit}"
                ))
            }
            Cmd::Next => Ok("r = s.hop(1)".to_string()),
            Cmd::Hop(expr) => Ok(format!("r = s.hop({})", gen_expr(expr))),
            Cmd::ToLimit => Ok("s.cursor = s.limit\nr = True".to_string()),
            Cmd::AtLimit => Ok("r = s.cursor == s.limit".to_string()),
            Cmd::SetMark(name) => Ok(format!("self.i_{} = s.cursor\nr = True", name.name)),
            Cmd::ToMark(expr) => Ok(format!("r = s.to_mark({})", gen_expr(expr))),
            Cmd::AtMark(expr) => Ok(format!("r = s.cursor == {}", gen_expr(expr))),
            Cmd::LeftMark => Ok("self.left = s.cursor\nr = True".to_string()),
            Cmd::RightMark => Ok("self.right = s.cursor\nr = True".to_string()),
            Cmd::SliceFrom(arg) => Ok(format!(
                "r = s.set_range(self.left, self.right, {})",
                self.str_arg(arg)
            )),
            Cmd::Delete => Ok("r = s.set_range(self.left, self.right, '')".to_string()),
            Cmd::SliceTo(name) => Ok(format!(
                "r = self.s_{}.set_chars(s.get_range(self.left, self.right))",
                name.name
            )),
            Cmd::Insert(arg) => Ok(format!("r = s.insert({})", self.str_arg(arg))),
            Cmd::Attach(arg) => Ok(format!("r = s.attach({})", self.str_arg(arg))),
            Cmd::NonGrouping(name) => Ok(format!("r = s.out_grouping(_g_{})", name.name)),
            Cmd::Set(name) => Ok(format!("self.b_{} = True\nr = True", name.name)),
            Cmd::Unset(name) => Ok(format!("self.b_{} = False\nr = True", name.name)),
            Cmd::IntCmd { name, op, expr } => {
                let slot = format!("self.i_{}", name.name);
                let expr = gen_expr(expr);
                Ok(match op {
                    IntOp::Assign => format!("{slot} = {expr}\nr = True"),
                    IntOp::AddAssign => format!("{slot} += {expr}\nr = True"),
                    IntOp::SubAssign => format!("{slot} -= {expr}\nr = True"),
                    IntOp::MulAssign => format!("{slot} *= {expr}\nr = True"),
                    IntOp::DivAssign => format!("{slot} //= {expr}\nr = True"),
                    IntOp::Eq => format!("r = {slot} == {expr}"),
                    IntOp::Ne => format!("r = {slot} != {expr}"),
                    IntOp::Lt => format!("r = {slot} < {expr}"),
                    IntOp::Gt => format!("r = {slot} > {expr}"),
                    IntOp::Le => format!("r = {slot} <= {expr}"),
                    IntOp::Ge => format!("r = {slot} >= {expr}"),
                })
            }
            Cmd::Substring(id) => {
                let among_id =
                    self.analysis
                        .substring_links
                        .get(id)
                        .copied()
                        .ok_or_else(|| Error::Codegen {
                            message: "substring has no linked among".to_string(),
                        })?;
                let table = self.table(among_id, mode)?;
                Ok(format!(
                    "a_{table} = self._find_among(s, _a_{table})\nr = a_{table} >= 0"
                ))
            }
            Cmd::Among(among) => self.gen_among(among, mode),
            Cmd::True => Ok("r = True".to_string()),
            Cmd::False => Ok("r = False".to_string()),
            Cmd::Empty => Ok("r = True".to_string()),
        }
    }

    fn gen_among(&mut self, among: &Among, mode: Mode) -> Result<String> {
        let table = self.table(among.id, mode)?;
        let mut blocks = vec![];
        if !self.analysis.amongs_with_substring.contains(&among.id) {
            blocks.push(format!(
                "a_{table} = self._find_among(s, _a_{table})\nr = a_{table} >= 0"
            ));
        }
        if let Some(common) = &among.common {
            blocks.push(self.gen_cmd(common, mode)?);
        }
        let mut dispatch = String::new();
        for (index, arm) in among.arms.iter().enumerate() {
            let action = match &arm.action {
                Some(action) => self.gen_cmd(action, mode)?,
                None => "r = True".to_string(),
            };
            let guard = if index == 0 { "if" } else { "elif" };
            dispatch.push_str(&format!(
                "{guard} a_{table} == {index}:\n{}\n",
                indent(&action, "  ")
            ));
        }
        dispatch.push_str("else:\n  r = False");
        blocks.push(dispatch);
        Ok(chain(blocks))
    }

    fn str_arg(&self, arg: &StrArg) -> String {
        match arg {
            StrArg::Literal(text) => py_str(text),
            StrArg::Ref(name) => format!("self.s_{}.chars", name.name),
        }
    }
}

fn gen_expr(expr: &Expr) -> String {
    match expr {
        Expr::Int(value) => value.to_string(),
        Expr::IntRef(name) => format!("self.i_{}", name.name),
        Expr::MaxInt => "MAXINT".to_string(),
        Expr::MinInt => "MININT".to_string(),
        Expr::Cursor => "s.cursor".to_string(),
        Expr::Limit => "s.limit".to_string(),
        Expr::Size => "len(s)".to_string(),
        Expr::SizeOf(name) => format!("len(self.s_{})", name.name),
        Expr::Neg(inner) => format!("(-{})", gen_expr(inner)),
        Expr::Add(lhs, rhs) => format!("({} + {})", gen_expr(lhs), gen_expr(rhs)),
        Expr::Sub(lhs, rhs) => format!("({} - {})", gen_expr(lhs), gen_expr(rhs)),
        Expr::Mul(lhs, rhs) => format!("{} * {}", gen_expr(lhs), gen_expr(rhs)),
        Expr::Div(lhs, rhs) => format!("{} // {}", gen_expr(lhs), gen_expr(rhs)),
    }
}

/// Chain code blocks so each one runs only if the previous left `r` true.
fn chain(blocks: Vec<String>) -> String {
    let mut iter = blocks.into_iter();
    let mut code = iter.next().unwrap_or_default();
    let mut prefix = String::new();
    for block in iter {
        code.push_str(&format!("\n{prefix}if r:\n"));
        prefix.push_str("  ");
        code.push_str(&indent(&block, &prefix));
    }
    code
}

fn indent(block: &str, pad: &str) -> String {
    block
        .lines()
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render text as a Python string literal; non-ASCII characters are kept
/// as escapes so the emitted module is plain ASCII.
fn py_str(text: &str) -> String {
    let mut out = String::from("'");
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ' '..='~' => out.push(c),
            c if (c as u32) <= 0xffff => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push_str(&format!("\\U{:08x}", c as u32)),
        }
    }
    out.push('\'');
    out
}
