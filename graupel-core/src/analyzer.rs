use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::{Error, Result};
use crate::parser::{
    Among, Cmd, CmdSpan, Expr, GroupingItem, GroupingOp, NameSpan, SourceUnit, StrArg,
};

/// Direction a command executes in.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum Mode {
    Forward,
    Backward,
}

/// What a declared name stands for.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Kind {
    String,
    Integer,
    Boolean,
    Routine,
    Grouping,
}

impl Kind {
    fn describe(&self) -> &'static str {
        match self {
            Kind::String => "a string",
            Kind::Integer => "an integer",
            Kind::Boolean => "a boolean",
            Kind::Routine => "a routine",
            Kind::Grouping => "a grouping",
        }
    }
}

/// Per-routine facts the code generator works from.
#[derive(Debug, PartialEq, Clone)]
pub struct RoutineInfo {
    pub def_mode: Mode,
    /// Variants to emit; one entry, or Forward and Backward for a
    /// dual-form routine.
    pub modes: Vec<Mode>,
    pub is_external: bool,
}

impl RoutineInfo {
    pub fn is_dual(&self) -> bool {
        self.modes.len() == 2
    }
}

/// One probe entry of a linearized among dispatcher.
#[derive(Debug, PartialEq, Clone)]
pub struct AmongEntry {
    /// Pattern in source order (even in backward mode; the runtime
    /// matches it right to left there).
    pub text: String,
    /// Gating routine, if the pattern carried one.
    pub routine: Option<String>,
    /// Index of the arm whose action runs on a match.
    pub arm: usize,
}

/// An among dispatcher compiled for one direction.
#[derive(Debug, PartialEq, Clone)]
pub struct CompiledAmong {
    pub entries: Vec<AmongEntry>,
}

#[derive(Debug)]
pub struct Analysis {
    pub kinds: HashMap<String, Kind>,
    /// Externals in declaration order.
    pub externals: Vec<String>,
    /// Materialized groupings in definition order.
    pub groupings: Vec<(String, BTreeSet<char>)>,
    pub routines: HashMap<String, RoutineInfo>,
    /// Among dispatchers keyed by among node id and direction.
    pub amongs: HashMap<(usize, Mode), CompiledAmong>,
    /// substring node id -> among node id it probes for.
    pub substring_links: HashMap<usize, usize>,
    /// Amongs whose probe is emitted by an earlier `substring`.
    pub amongs_with_substring: HashSet<usize>,
}

pub fn analyze(unit: &SourceUnit) -> Result<Analysis> {
    let kinds = declare_names(unit)?;
    let groupings = materialize_groupings(unit, &kinds)?;

    let mut links = HashMap::new();
    let mut with_substring = HashSet::new();
    for def in &unit.routine_defs {
        check_routine_name(&kinds, &def.name)?;
        let mut check = BodyCheck {
            kinds: &kinds,
            bra_seen: false,
            ket_seen: false,
            pending_substring: None,
            links: &mut links,
            with_substring: &mut with_substring,
        };
        check.walk(&def.body)?;
        if let Some((_, line, col)) = check.pending_substring {
            return Err(Error::mode(line, col, "substring without a following among"));
        }
    }

    let mut duplicate_defs = HashSet::new();
    for def in &unit.routine_defs {
        if !duplicate_defs.insert(def.name.name.clone()) {
            return Err(Error::name(
                def.name.line,
                def.name.col,
                format!("routine '{}' is defined twice", def.name.name),
            ));
        }
    }

    let (uses, amongs) = propagate_modes(unit, &kinds)?;
    let routines = assign_variants(unit, &kinds, &uses);

    Ok(Analysis {
        kinds,
        externals: unit.externals.iter().map(|n| n.name.clone()).collect(),
        groupings,
        routines,
        amongs,
        substring_links: links,
        amongs_with_substring: with_substring,
    })
}

fn declare_names(unit: &SourceUnit) -> Result<HashMap<String, Kind>> {
    let mut kinds = HashMap::new();
    let sections: [(&[NameSpan], Kind); 6] = [
        (&unit.strings, Kind::String),
        (&unit.integers, Kind::Integer),
        (&unit.booleans, Kind::Boolean),
        (&unit.routines, Kind::Routine),
        (&unit.externals, Kind::Routine),
        (&unit.groupings, Kind::Grouping),
    ];
    for (names, kind) in sections {
        for name in names {
            if kinds.insert(name.name.clone(), kind).is_some() {
                return Err(Error::name(
                    name.line,
                    name.col,
                    format!("duplicate declaration of '{}'", name.name),
                ));
            }
        }
    }
    Ok(kinds)
}

fn check_routine_name(kinds: &HashMap<String, Kind>, name: &NameSpan) -> Result<()> {
    match kinds.get(&name.name) {
        Some(Kind::Routine) => Ok(()),
        Some(kind) => Err(Error::name(
            name.line,
            name.col,
            format!("'{}' is {}, not a routine", name.name, kind.describe()),
        )),
        None => Err(Error::name(
            name.line,
            name.col,
            format!("undeclared name '{}'", name.name),
        )),
    }
}

fn expect_kind(kinds: &HashMap<String, Kind>, name: &NameSpan, kind: Kind) -> Result<()> {
    match kinds.get(&name.name) {
        Some(k) if *k == kind => Ok(()),
        Some(k) => Err(Error::name(
            name.line,
            name.col,
            format!(
                "'{}' is {}, expected {}",
                name.name,
                k.describe(),
                kind.describe()
            ),
        )),
        None => Err(Error::name(
            name.line,
            name.col,
            format!("undeclared name '{}'", name.name),
        )),
    }
}

fn materialize_groupings(
    unit: &SourceUnit,
    kinds: &HashMap<String, Kind>,
) -> Result<Vec<(String, BTreeSet<char>)>> {
    let mut defined: BTreeMap<String, BTreeSet<char>> = BTreeMap::new();
    let mut ordered = vec![];
    for def in &unit.grouping_defs {
        expect_kind(kinds, &def.name, Kind::Grouping)?;
        if defined.contains_key(&def.name.name) {
            return Err(Error::name(
                def.name.line,
                def.name.col,
                format!("grouping '{}' is defined twice", def.name.name),
            ));
        }
        let mut set = BTreeSet::new();
        for (op, item) in &def.items {
            let chars: BTreeSet<char> = match item {
                GroupingItem::Chars(text) => text.chars().collect(),
                GroupingItem::Ref(name) => {
                    expect_kind(kinds, name, Kind::Grouping)?;
                    match defined.get(&name.name) {
                        Some(set) => set.clone(),
                        None => {
                            return Err(Error::name(
                                name.line,
                                name.col,
                                format!("grouping '{}' used before its definition", name.name),
                            ));
                        }
                    }
                }
            };
            match op {
                GroupingOp::Union => set.extend(chars),
                GroupingOp::Difference => {
                    set = set.difference(&chars).copied().collect();
                }
            }
        }
        defined.insert(def.name.name.clone(), set.clone());
        ordered.push((def.name.name.clone(), set));
    }
    Ok(ordered)
}

/// Reference resolution plus the sequencing rules of slice marks and
/// `substring`/`among` pairing, walked in source order.
struct BodyCheck<'a> {
    kinds: &'a HashMap<String, Kind>,
    bra_seen: bool,
    ket_seen: bool,
    pending_substring: Option<(usize, usize, usize)>,
    links: &'a mut HashMap<usize, usize>,
    with_substring: &'a mut HashSet<usize>,
}

impl<'a> BodyCheck<'a> {
    fn walk(&mut self, cmd: &CmdSpan) -> Result<()> {
        match &cmd.cmd {
            Cmd::Literal(_)
            | Cmd::Next
            | Cmd::ToLimit
            | Cmd::AtLimit
            | Cmd::True
            | Cmd::False
            | Cmd::Empty => Ok(()),
            Cmd::NameRef(name) => match self.kinds.get(&name.name) {
                Some(Kind::Routine | Kind::Grouping | Kind::Boolean | Kind::String) => Ok(()),
                Some(kind) => Err(Error::name(
                    name.line,
                    name.col,
                    format!(
                        "'{}' is {} and cannot be used as a command",
                        name.name,
                        kind.describe()
                    ),
                )),
                None => Err(Error::name(
                    name.line,
                    name.col,
                    format!("undeclared name '{}'", name.name),
                )),
            },
            Cmd::Sequence(items) | Cmd::Or(items) | Cmd::And(items) => {
                for item in items {
                    self.walk(item)?;
                }
                Ok(())
            }
            Cmd::Not(inner)
            | Cmd::Test(inner)
            | Cmd::Try(inner)
            | Cmd::Do(inner)
            | Cmd::Fail(inner)
            | Cmd::Repeat(inner)
            | Cmd::Goto(inner)
            | Cmd::GoPast(inner)
            | Cmd::Backwards(inner) => self.walk(inner),
            Cmd::Loop(expr, inner) | Cmd::AtLeast(expr, inner) => {
                self.check_expr(expr)?;
                self.walk(inner)
            }
            Cmd::Hop(expr) | Cmd::ToMark(expr) | Cmd::AtMark(expr) => self.check_expr(expr),
            Cmd::SetMark(name) => expect_kind(self.kinds, name, Kind::Integer),
            Cmd::SetLimit(bound, body) => {
                self.walk(bound)?;
                self.walk(body)
            }
            Cmd::LeftMark => {
                self.bra_seen = true;
                Ok(())
            }
            Cmd::RightMark => {
                if !self.bra_seen {
                    return Err(Error::mode(cmd.line, cmd.col, "']' before any '['"));
                }
                self.ket_seen = true;
                Ok(())
            }
            Cmd::SliceFrom(arg) => {
                self.check_slice(cmd)?;
                self.check_str_arg(arg)
            }
            Cmd::Delete => self.check_slice(cmd),
            Cmd::SliceTo(name) => {
                self.check_slice(cmd)?;
                expect_kind(self.kinds, name, Kind::String)
            }
            Cmd::Insert(arg) | Cmd::Attach(arg) => self.check_str_arg(arg),
            Cmd::NonGrouping(name) => expect_kind(self.kinds, name, Kind::Grouping),
            Cmd::Set(name) | Cmd::Unset(name) => expect_kind(self.kinds, name, Kind::Boolean),
            Cmd::IntCmd { name, expr, .. } => {
                expect_kind(self.kinds, name, Kind::Integer)?;
                self.check_expr(expr)
            }
            Cmd::Substring(id) => {
                if let Some((_, line, col)) = self.pending_substring {
                    return Err(Error::mode(line, col, "substring without a following among"));
                }
                self.pending_substring = Some((*id, cmd.line, cmd.col));
                Ok(())
            }
            Cmd::Among(among) => self.check_among(among),
        }
    }

    fn check_among(&mut self, among: &Among) -> Result<()> {
        if let Some((id, _, _)) = self.pending_substring.take() {
            self.links.insert(id, among.id);
            self.with_substring.insert(among.id);
        }
        if let Some(common) = &among.common {
            self.walk(common)?;
        }
        for arm in &among.arms {
            for pattern in &arm.patterns {
                if let Some(routine) = &pattern.routine {
                    expect_kind(self.kinds, routine, Kind::Routine)?;
                }
            }
            if let Some(action) = &arm.action {
                self.walk(action)?;
            }
        }
        Ok(())
    }

    fn check_slice(&self, cmd: &CmdSpan) -> Result<()> {
        if (self.bra_seen || self.ket_seen) && !(self.bra_seen && self.ket_seen) {
            return Err(Error::mode(
                cmd.line,
                cmd.col,
                "slice command on a half-established '[' ']' pair",
            ));
        }
        Ok(())
    }

    fn check_str_arg(&self, arg: &StrArg) -> Result<()> {
        match arg {
            StrArg::Literal(_) => Ok(()),
            StrArg::Ref(name) => expect_kind(self.kinds, name, Kind::String),
        }
    }

    fn check_expr(&self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Int(_)
            | Expr::MaxInt
            | Expr::MinInt
            | Expr::Cursor
            | Expr::Limit
            | Expr::Size => Ok(()),
            Expr::IntRef(name) => expect_kind(self.kinds, name, Kind::Integer),
            Expr::SizeOf(name) => expect_kind(self.kinds, name, Kind::String),
            Expr::Neg(inner) => self.check_expr(inner),
            Expr::Add(lhs, rhs)
            | Expr::Sub(lhs, rhs)
            | Expr::Mul(lhs, rhs)
            | Expr::Div(lhs, rhs) => {
                self.check_expr(lhs)?;
                self.check_expr(rhs)
            }
        }
    }
}

type Uses = HashMap<String, BTreeSet<Mode>>;

/// Walk every reachable (routine, entry mode) pair, recording which modes
/// each routine is used in and compiling each among for every direction
/// it is reachable in.
fn propagate_modes(
    unit: &SourceUnit,
    kinds: &HashMap<String, Kind>,
) -> Result<(Uses, HashMap<(usize, Mode), CompiledAmong>)> {
    let defs: HashMap<&str, &CmdSpan> = unit
        .routine_defs
        .iter()
        .map(|def| (def.name.name.as_str(), &def.body))
        .collect();

    let mut uses: Uses = HashMap::new();
    let mut amongs = HashMap::new();
    let mut queue: VecDeque<(String, Mode, usize, usize)> = VecDeque::new();

    for def in &unit.routine_defs {
        let mode = if def.backward_mode {
            Mode::Backward
        } else {
            Mode::Forward
        };
        queue.push_back((def.name.name.clone(), mode, def.name.line, def.name.col));
    }
    for external in &unit.externals {
        queue.push_back((
            external.name.clone(),
            Mode::Forward,
            external.line,
            external.col,
        ));
    }

    let mut processed = HashSet::new();
    while let Some((name, mode, line, col)) = queue.pop_front() {
        if !processed.insert((name.clone(), mode)) {
            continue;
        }
        uses.entry(name.clone()).or_default().insert(mode);
        let Some(&body) = defs.get(name.as_str()) else {
            return Err(Error::name(
                line,
                col,
                format!("routine '{name}' is never defined"),
            ));
        };
        walk_uses(body, mode, kinds, &mut queue, &mut amongs);
    }

    Ok((uses, amongs))
}

fn walk_uses(
    cmd: &CmdSpan,
    mode: Mode,
    kinds: &HashMap<String, Kind>,
    queue: &mut VecDeque<(String, Mode, usize, usize)>,
    amongs: &mut HashMap<(usize, Mode), CompiledAmong>,
) {
    match &cmd.cmd {
        Cmd::NameRef(name) => {
            if kinds.get(&name.name) == Some(&Kind::Routine) {
                queue.push_back((name.name.clone(), mode, name.line, name.col));
            }
        }
        Cmd::Backwards(inner) => walk_uses(inner, Mode::Backward, kinds, queue, amongs),
        Cmd::Sequence(items) | Cmd::Or(items) | Cmd::And(items) => {
            for item in items {
                walk_uses(item, mode, kinds, queue, amongs);
            }
        }
        Cmd::Not(inner)
        | Cmd::Test(inner)
        | Cmd::Try(inner)
        | Cmd::Do(inner)
        | Cmd::Fail(inner)
        | Cmd::Repeat(inner)
        | Cmd::Goto(inner)
        | Cmd::GoPast(inner)
        | Cmd::Loop(_, inner)
        | Cmd::AtLeast(_, inner) => walk_uses(inner, mode, kinds, queue, amongs),
        Cmd::SetLimit(bound, body) => {
            walk_uses(bound, mode, kinds, queue, amongs);
            walk_uses(body, mode, kinds, queue, amongs);
        }
        Cmd::Among(among) => {
            amongs
                .entry((among.id, mode))
                .or_insert_with(|| compile_among(among, mode));
            for arm in &among.arms {
                for pattern in &arm.patterns {
                    if let Some(routine) = &pattern.routine {
                        queue.push_back((
                            routine.name.clone(),
                            mode,
                            routine.line,
                            routine.col,
                        ));
                    }
                }
            }
            if let Some(common) = &among.common {
                walk_uses(common, mode, kinds, queue, amongs);
            }
            for arm in &among.arms {
                if let Some(action) = &arm.action {
                    walk_uses(action, mode, kinds, queue, amongs);
                }
            }
        }
        _ => {}
    }
}

/// Decide which variants each routine is emitted in. A routine used from
/// both directions gets two forms only when its generated text would
/// differ between them.
fn assign_variants(
    unit: &SourceUnit,
    kinds: &HashMap<String, Kind>,
    uses: &Uses,
) -> HashMap<String, RoutineInfo> {
    let externals: HashSet<&str> = unit.externals.iter().map(|n| n.name.as_str()).collect();

    let mut base_sensitive = HashMap::new();
    let mut calls = HashMap::new();
    for def in &unit.routine_defs {
        base_sensitive.insert(def.name.name.clone(), is_direction_sensitive(&def.body));
        let mut called = vec![];
        collect_open_calls(&def.body, kinds, &mut called);
        calls.insert(def.name.name.clone(), called);
    }

    let mut dual: HashSet<String> = HashSet::new();
    loop {
        let mut changed = false;
        for def in &unit.routine_defs {
            let name = &def.name.name;
            if dual.contains(name) {
                continue;
            }
            let used_both = uses.get(name).map(|m| m.len() == 2).unwrap_or(false);
            let sensitive = base_sensitive[name]
                || calls[name].iter().any(|callee| dual.contains(callee));
            if used_both && sensitive {
                dual.insert(name.clone());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut routines = HashMap::new();
    for def in &unit.routine_defs {
        let name = &def.name.name;
        let def_mode = if def.backward_mode {
            Mode::Backward
        } else {
            Mode::Forward
        };
        let modes = if dual.contains(name) {
            vec![Mode::Forward, Mode::Backward]
        } else {
            match uses.get(name) {
                Some(used) if used.len() == 1 => vec![*used.iter().next().unwrap()],
                _ => vec![def_mode],
            }
        };
        routines.insert(
            name.clone(),
            RoutineInfo {
                def_mode,
                modes,
                is_external: externals.contains(name.as_str()),
            },
        );
    }
    routines
}

/// A command subtree is direction-sensitive when its generated text
/// depends on the entry direction: an among dispatcher (reversed keys),
/// a substring probe, or a `backwards` wrapper (which swaps cursor and
/// limit only when entered forwards). Subtrees under `backwards` always
/// run backward and cannot contribute.
fn is_direction_sensitive(cmd: &CmdSpan) -> bool {
    match &cmd.cmd {
        Cmd::Among(_) | Cmd::Substring(_) | Cmd::Backwards(_) => true,
        Cmd::Sequence(items) | Cmd::Or(items) | Cmd::And(items) => {
            items.iter().any(is_direction_sensitive)
        }
        Cmd::Not(inner)
        | Cmd::Test(inner)
        | Cmd::Try(inner)
        | Cmd::Do(inner)
        | Cmd::Fail(inner)
        | Cmd::Repeat(inner)
        | Cmd::Goto(inner)
        | Cmd::GoPast(inner)
        | Cmd::Loop(_, inner)
        | Cmd::AtLeast(_, inner) => is_direction_sensitive(inner),
        Cmd::SetLimit(bound, body) => {
            is_direction_sensitive(bound) || is_direction_sensitive(body)
        }
        _ => false,
    }
}

/// Routine calls whose surrounding direction follows the entry direction,
/// i.e. calls not wrapped in `backwards`.
fn collect_open_calls(cmd: &CmdSpan, kinds: &HashMap<String, Kind>, out: &mut Vec<String>) {
    match &cmd.cmd {
        Cmd::NameRef(name) => {
            if kinds.get(&name.name) == Some(&Kind::Routine) {
                out.push(name.name.clone());
            }
        }
        Cmd::Backwards(_) => {}
        Cmd::Sequence(items) | Cmd::Or(items) | Cmd::And(items) => {
            for item in items {
                collect_open_calls(item, kinds, out);
            }
        }
        Cmd::Not(inner)
        | Cmd::Test(inner)
        | Cmd::Try(inner)
        | Cmd::Do(inner)
        | Cmd::Fail(inner)
        | Cmd::Repeat(inner)
        | Cmd::Goto(inner)
        | Cmd::GoPast(inner)
        | Cmd::Loop(_, inner)
        | Cmd::AtLeast(_, inner) => collect_open_calls(inner, kinds, out),
        Cmd::SetLimit(bound, body) => {
            collect_open_calls(bound, kinds, out);
            collect_open_calls(body, kinds, out);
        }
        Cmd::Among(among) => {
            for arm in &among.arms {
                for pattern in &arm.patterns {
                    if let Some(routine) = &pattern.routine {
                        out.push(routine.name.clone());
                    }
                }
            }
            if let Some(common) = &among.common {
                collect_open_calls(common, kinds, out);
            }
            for arm in &among.arms {
                if let Some(action) = &arm.action {
                    collect_open_calls(action, kinds, out);
                }
            }
        }
        _ => {}
    }
}

/// Compile an among's arms for one direction: the patterns are inserted
/// into a trie in match order (reversed characters when matching right to
/// left) and the trie is linearized into a longest-match-first probe
/// table. Declaration order breaks length ties; a duplicate pattern
/// resolves to its first arm.
pub fn compile_among(among: &Among, mode: Mode) -> CompiledAmong {
    let mut trie = AmongTrie::new();
    let mut order = 0;
    for (arm_index, arm) in among.arms.iter().enumerate() {
        for pattern in &arm.patterns {
            let key: Vec<char> = match mode {
                Mode::Forward => pattern.text.chars().collect(),
                Mode::Backward => pattern.text.chars().rev().collect(),
            };
            trie.insert(
                &key,
                Accept {
                    order,
                    text: pattern.text.clone(),
                    routine: pattern.routine.as_ref().map(|r| r.name.clone()),
                    arm: arm_index,
                },
            );
            order += 1;
        }
    }
    CompiledAmong {
        entries: trie.linearize(),
    }
}

#[derive(Debug, Clone)]
struct Accept {
    order: usize,
    text: String,
    routine: Option<String>,
    arm: usize,
}

struct TrieNode {
    edges: BTreeMap<char, usize>,
    accept: Option<Accept>,
}

/// Prefix trie over among patterns in match order.
pub struct AmongTrie {
    nodes: Vec<TrieNode>,
}

impl AmongTrie {
    fn new() -> Self {
        Self {
            nodes: vec![TrieNode {
                edges: BTreeMap::new(),
                accept: None,
            }],
        }
    }

    fn insert(&mut self, key: &[char], accept: Accept) {
        let mut node = 0;
        for &c in key {
            let next = match self.nodes[node].edges.get(&c) {
                Some(&next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(TrieNode {
                        edges: BTreeMap::new(),
                        accept: None,
                    });
                    self.nodes[node].edges.insert(c, next);
                    next
                }
            };
            node = next;
        }
        // first declaration wins for duplicate patterns
        if self.nodes[node].accept.is_none() {
            self.nodes[node].accept = Some(accept);
        }
    }

    /// Flatten accepting states into probe order: deepest first, then
    /// declaration order.
    fn linearize(&self) -> Vec<AmongEntry> {
        let mut accepts = vec![];
        let mut stack = vec![(0usize, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if let Some(accept) = &self.nodes[node].accept {
                accepts.push((depth, accept.clone()));
            }
            for &next in self.nodes[node].edges.values() {
                stack.push((next, depth + 1));
            }
        }
        accepts.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.order.cmp(&b.1.order)));
        accepts
            .into_iter()
            .map(|(_, accept)| AmongEntry {
                text: accept.text,
                routine: accept.routine,
                arm: accept.arm,
            })
            .collect()
    }
}
