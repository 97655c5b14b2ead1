/*!
Structured control flow recovery.

A SPIR-V function body is a list of basic blocks joined by branches, with
merge instructions marking where selections and loops reconverge. WGSL only
has nested statements. [`structurize`] walks the blocks from the entry point
and turns every branch into either "keep going with the next block in this
statement list", an `if`/`switch`/`loop` whose arms are nested lists, or one of
`break`, `continue` and `break if`.

Each nested list is a [`Body`] tagged with a scope. Scopes form a tree that
mirrors WGSL block nesting, which the emitter uses to decide where values
must be declared so every use can see them.
*/

use super::Error;
use crate::FastHashMap;
use spirv::Word;

#[derive(Clone, Debug, PartialEq)]
pub(super) enum Terminator {
    Branch(Word),
    BranchConditional {
        condition: Word,
        accept: Word,
        reject: Word,
    },
    Switch {
        selector: Word,
        default: Word,
        /// Case literal and target, in declaration order.
        targets: Vec<(u32, Word)>,
    },
    Return,
    ReturnValue(Word),
    Kill,
    Unreachable,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) enum Merge {
    Selection(Word),
    Loop { merge: Word, continuing: Word },
}

pub(super) type ScopeId = usize;

/// A list of nodes that becomes one WGSL statement list.
#[derive(Debug, Default, PartialEq)]
pub(super) struct Body {
    pub scope: ScopeId,
    pub nodes: Vec<Node>,
}

#[derive(Debug, PartialEq)]
pub(super) struct Case {
    pub literals: Vec<u32>,
    pub default: bool,
    pub body: Body,
}

/// Blocks are referred to by their position in the function's block list.
#[derive(Debug, PartialEq)]
pub(super) enum Node {
    /// The block's instructions, with nothing after them.
    Block(usize),
    /// The block's instructions, then an `if` on its conditional branch.
    If {
        block: usize,
        accept: Body,
        reject: Body,
    },
    /// The block's instructions, then a `switch` on its selector.
    Switch { block: usize, cases: Vec<Case> },
    Loop { body: Body, continuing: Body },
    Break,
    Continue,
    /// The block's instructions, then `break if` on its condition, negated
    /// when the loop exits on the false edge.
    BreakIf { block: usize, negate: bool },
    /// The block's instructions, then its return.
    Return(usize),
    Kill,
    /// An `OpUnreachable`; control never gets here.
    Unreachable,
}

/// The parent of every scope; the function body is scope 0.
#[derive(Debug)]
pub(super) struct Scopes {
    parents: Vec<Option<ScopeId>>,
    continuing: Vec<bool>,
}

impl Scopes {
    fn new() -> Self {
        Scopes {
            parents: vec![None],
            continuing: vec![false],
        }
    }

    fn child(&mut self, parent: ScopeId, continuing: bool) -> ScopeId {
        self.parents.push(Some(parent));
        self.continuing.push(continuing);
        self.parents.len() - 1
    }

    #[cfg(test)]
    fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.parents[scope]
    }

    fn depth(&self, mut scope: ScopeId) -> usize {
        let mut depth = 0;
        while let Some(parent) = self.parents[scope] {
            scope = parent;
            depth += 1;
        }
        depth
    }

    /// The innermost scope enclosing both `a` and `b`.
    pub fn common_ancestor(&self, mut a: ScopeId, mut b: ScopeId) -> ScopeId {
        let (mut depth_a, mut depth_b) = (self.depth(a), self.depth(b));
        while depth_a > depth_b {
            a = self.parents[a].unwrap_or(0);
            depth_a -= 1;
        }
        while depth_b > depth_a {
            b = self.parents[b].unwrap_or(0);
            depth_b -= 1;
        }
        while a != b {
            a = self.parents[a].unwrap_or(0);
            b = self.parents[b].unwrap_or(0);
        }
        a
    }

    /// Whether the path from `scope` up to (but excluding) `ancestor` passes
    /// through a `continuing` block.
    pub fn crosses_continuing(&self, mut scope: ScopeId, ancestor: ScopeId) -> bool {
        while scope != ancestor {
            if self.continuing[scope] {
                return true;
            }
            match self.parents[scope] {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        false
    }
}

/// The shape of a function body's control flow.
#[derive(Debug)]
pub(super) struct Structure {
    pub body: Body,
    pub scopes: Scopes,
    /// Scope of the list each block's instructions are emitted into, `None`
    /// for blocks control never reaches.
    pub block_scopes: Vec<Option<ScopeId>>,
}

/// The view of a block the structurizer needs.
pub(super) struct BlockShape<'a> {
    pub id: Word,
    pub merge: Option<Merge>,
    pub terminator: &'a Terminator,
}

#[derive(Clone, Copy, Debug)]
enum Construct {
    Selection {
        merge: Word,
    },
    Switch {
        merge: Word,
    },
    Loop {
        header: Word,
        merge: Word,
        continuing: Word,
    },
}

/// What a list of nodes is the body of. Decides what reaching the list's
/// exit means.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Region {
    Function,
    Selection,
    Case,
    LoopBody,
    Continuing,
}

/// Where a branch goes, relative to the list it is taken from.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Target {
    /// The end of the current list.
    Exit,
    Break,
    Continue,
    /// Another block of the current list.
    Next(Word),
}

struct Structurizer<'a> {
    blocks: &'a [BlockShape<'a>],
    index: FastHashMap<Word, usize>,
    visited: Vec<bool>,
    scopes: Scopes,
    block_scopes: Vec<Option<ScopeId>>,
    constructs: Vec<Construct>,
}

pub(super) fn structurize(blocks: &[BlockShape]) -> Result<Structure, Error> {
    let first = blocks.first().ok_or(Error::EmptyFunction(0))?.id;
    let mut structurizer = Structurizer {
        blocks,
        index: blocks
            .iter()
            .enumerate()
            .map(|(index, block)| (block.id, index))
            .collect(),
        visited: vec![false; blocks.len()],
        scopes: Scopes::new(),
        block_scopes: vec![None; blocks.len()],
        constructs: Vec::new(),
    };
    let body = structurizer.region(first, None, Region::Function, 0, false)?;
    Ok(Structure {
        body,
        scopes: structurizer.scopes,
        block_scopes: structurizer.block_scopes,
    })
}

impl Structurizer<'_> {
    fn classify(&self, target: Word, exit: Option<Word>, origin: Word) -> Result<Target, Error> {
        if exit == Some(target) {
            return Ok(Target::Exit);
        }
        let mut inside_switch = false;
        for construct in self.constructs.iter().rev() {
            match *construct {
                Construct::Selection { merge } if merge == target => {
                    return Err(Error::UnsupportedControlFlow(
                        origin,
                        "branch out of an enclosing selection",
                    ))
                }
                Construct::Selection { .. } => {}
                Construct::Switch { merge } if merge == target => return Ok(Target::Break),
                Construct::Switch { .. } => inside_switch = true,
                Construct::Loop {
                    header,
                    merge,
                    continuing,
                } => {
                    if target == merge {
                        if inside_switch {
                            return Err(Error::UnsupportedControlFlow(
                                origin,
                                "loop exit from inside a switch",
                            ));
                        }
                        return Ok(Target::Break);
                    }
                    if target == continuing || target == header {
                        return Ok(Target::Continue);
                    }
                    break;
                }
            }
        }
        Ok(Target::Next(target))
    }

    /// The statement that leaves a list of kind `region` early.
    fn exit_node(region: Region, origin: Word) -> Result<Node, Error> {
        match region {
            Region::LoopBody => Ok(Node::Continue),
            Region::Case => Ok(Node::Break),
            Region::Function | Region::Selection | Region::Continuing => Err(
                Error::UnsupportedControlFlow(origin, "early exit from a selection"),
            ),
        }
    }

    fn target_node(target: Target, region: Region, origin: Word) -> Result<Node, Error> {
        match target {
            Target::Exit => Self::exit_node(region, origin),
            Target::Break if region == Region::Continuing => Err(Error::UnsupportedControlFlow(
                origin,
                "break from a continuing block",
            )),
            Target::Break => Ok(Node::Break),
            Target::Continue => Ok(Node::Continue),
            Target::Next(_) => Err(Error::UnsupportedControlFlow(
                origin,
                "conditional branch without a merge",
            )),
        }
    }

    fn single(&mut self, parent: ScopeId, node: Option<Node>) -> Body {
        Body {
            scope: self.scopes.child(parent, false),
            nodes: node.into_iter().collect(),
        }
    }

    /// Build the list starting at block `start` and ending when control
    /// reaches `exit` or leaves the list.
    fn region(
        &mut self,
        start: Word,
        exit: Option<Word>,
        region: Region,
        scope: ScopeId,
        mut entering_loop: bool,
    ) -> Result<Body, Error> {
        let mut nodes = Vec::new();
        let mut current = start;
        loop {
            let index = *self.index.get(&current).ok_or(Error::InvalidId(current))?;
            if self.visited[index] && !entering_loop {
                return Err(Error::UnsupportedControlFlow(
                    current,
                    "block is reached from two places",
                ));
            }
            self.visited[index] = true;
            self.block_scopes[index] = Some(scope);
            let blocks = self.blocks;
            let block = &blocks[index];
            let merge = if entering_loop {
                entering_loop = false;
                None
            } else {
                block.merge
            };

            let next = match (merge, block.terminator) {
                (Some(Merge::Loop { merge, continuing }), _) => {
                    // The header is entered again as the first block of the body.
                    self.constructs.push(Construct::Loop {
                        header: current,
                        merge,
                        continuing,
                    });
                    let body_scope = self.scopes.child(scope, false);
                    let body = self.region(
                        current,
                        Some(continuing),
                        Region::LoopBody,
                        body_scope,
                        true,
                    )?;
                    let continuing_scope = self.scopes.child(body_scope, true);
                    let continuing_body = if continuing == current {
                        Body {
                            scope: continuing_scope,
                            nodes: Vec::new(),
                        }
                    } else {
                        self.region(
                            continuing,
                            Some(current),
                            Region::Continuing,
                            continuing_scope,
                            false,
                        )?
                    };
                    self.constructs.pop();
                    nodes.push(Node::Loop {
                        body,
                        continuing: continuing_body,
                    });
                    merge
                }
                (
                    Some(Merge::Selection(merge)),
                    &Terminator::BranchConditional { accept, reject, .. },
                ) => {
                    self.constructs.push(Construct::Selection { merge });
                    let accept = self.arm(accept, merge, scope)?;
                    let reject = self.arm(reject, merge, scope)?;
                    self.constructs.pop();
                    nodes.push(Node::If {
                        block: index,
                        accept,
                        reject,
                    });
                    merge
                }
                (
                    Some(Merge::Selection(merge)),
                    &Terminator::Switch {
                        default,
                        ref targets,
                        ..
                    },
                ) => {
                    self.constructs.push(Construct::Switch { merge });
                    let cases = self.cases(default, targets, merge, scope)?;
                    self.constructs.pop();
                    nodes.push(Node::Switch {
                        block: index,
                        cases,
                    });
                    merge
                }
                (_, &Terminator::Branch(target)) => {
                    nodes.push(Node::Block(index));
                    target
                }
                (_, &Terminator::BranchConditional { accept, reject, .. }) => {
                    let accept_target = self.classify(accept, exit, current)?;
                    let reject_target = self.classify(reject, exit, current)?;
                    match (accept_target, reject_target) {
                        (a, r) if a == r => {
                            nodes.push(Node::Block(index));
                            accept
                        }
                        (Target::Exit, Target::Break) | (Target::Break, Target::Exit)
                            if region == Region::Continuing =>
                        {
                            nodes.push(Node::BreakIf {
                                block: index,
                                negate: accept_target == Target::Exit,
                            });
                            break;
                        }
                        (Target::Next(_), Target::Next(_)) => {
                            return Err(Error::UnsupportedControlFlow(
                                current,
                                "conditional branch without a merge",
                            ))
                        }
                        (Target::Next(next), other) => {
                            let reject = Self::target_node(other, region, current)?;
                            let accept = self.single(scope, None);
                            let reject = self.single(scope, Some(reject));
                            nodes.push(Node::If {
                                block: index,
                                accept,
                                reject,
                            });
                            next
                        }
                        (other, Target::Next(next)) => {
                            let accept = Self::target_node(other, region, current)?;
                            let accept = self.single(scope, Some(accept));
                            let reject = self.single(scope, None);
                            nodes.push(Node::If {
                                block: index,
                                accept,
                                reject,
                            });
                            next
                        }
                        (a, r) => {
                            let accept = Self::target_node(a, region, current)?;
                            let reject = Self::target_node(r, region, current)?;
                            let accept = self.single(scope, Some(accept));
                            let reject = self.single(scope, Some(reject));
                            nodes.push(Node::If {
                                block: index,
                                accept,
                                reject,
                            });
                            break;
                        }
                    }
                }
                (_, &Terminator::Switch { .. }) => {
                    return Err(Error::UnsupportedControlFlow(
                        current,
                        "switch without a selection merge",
                    ))
                }
                (_, &Terminator::Return | &Terminator::ReturnValue(_)) => {
                    nodes.push(Node::Return(index));
                    break;
                }
                (_, &Terminator::Kill) => {
                    nodes.push(Node::Block(index));
                    nodes.push(Node::Kill);
                    break;
                }
                (_, &Terminator::Unreachable) => {
                    nodes.push(Node::Block(index));
                    nodes.push(Node::Unreachable);
                    break;
                }
            };

            match self.classify(next, exit, current)? {
                Target::Exit => break,
                Target::Next(target) => current = target,
                other => {
                    nodes.push(Self::target_node(other, region, current)?);
                    break;
                }
            }
        }
        Ok(Body { scope, nodes })
    }

    /// One arm of an `if` whose selection reconverges at `merge`.
    fn arm(&mut self, target: Word, merge: Word, scope: ScopeId) -> Result<Body, Error> {
        if target == merge {
            return Ok(self.single(scope, None));
        }
        match self.classify(target, Some(merge), target)? {
            Target::Next(_) => {
                let arm_scope = self.scopes.child(scope, false);
                self.region(target, Some(merge), Region::Selection, arm_scope, false)
            }
            Target::Break => Ok(self.single(scope, Some(Node::Break))),
            Target::Continue => Ok(self.single(scope, Some(Node::Continue))),
            Target::Exit => Ok(self.single(scope, None)),
        }
    }

    fn cases(
        &mut self,
        default: Word,
        targets: &[(u32, Word)],
        merge: Word,
        scope: ScopeId,
    ) -> Result<Vec<Case>, Error> {
        let mut groups: Vec<(Word, Vec<u32>)> = Vec::new();
        for &(literal, target) in targets {
            match groups.iter_mut().find(|&&mut (t, _)| t == target) {
                Some(&mut (_, ref mut literals)) => literals.push(literal),
                None => groups.push((target, vec![literal])),
            }
        }
        let default_shared = default != merge && groups.iter().any(|&(t, _)| t == default);

        let mut cases = Vec::with_capacity(groups.len() + 1);
        for (target, literals) in groups {
            let body = self.case_body(target, merge, scope)?;
            cases.push(Case {
                literals,
                default: default_shared && target == default,
                body,
            });
        }
        if !default_shared {
            let body = self.case_body(default, merge, scope)?;
            cases.push(Case {
                literals: Vec::new(),
                default: true,
                body,
            });
        }
        Ok(cases)
    }

    fn case_body(&mut self, target: Word, merge: Word, scope: ScopeId) -> Result<Body, Error> {
        let case_scope = self.scopes.child(scope, false);
        if target == merge {
            return Ok(Body {
                scope: case_scope,
                nodes: Vec::new(),
            });
        }
        match self.classify(target, Some(merge), target)? {
            Target::Next(_) => self.region(target, Some(merge), Region::Case, case_scope, false),
            Target::Continue => Ok(Body {
                scope: case_scope,
                nodes: vec![Node::Continue],
            }),
            _ => Err(Error::UnsupportedControlFlow(
                target,
                "switch case leaving the switch",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Cfg(Vec<(Word, Option<Merge>, Terminator)>);

    impl Cfg {
        fn shapes(&self) -> Vec<BlockShape> {
            self.0
                .iter()
                .map(|&(id, merge, ref terminator)| BlockShape {
                    id,
                    merge,
                    terminator,
                })
                .collect()
        }
    }

    fn cond(condition: Word, accept: Word, reject: Word) -> Terminator {
        Terminator::BranchConditional {
            condition,
            accept,
            reject,
        }
    }

    #[test]
    fn if_else() {
        let cfg = Cfg(vec![
            (10, Some(Merge::Selection(40)), cond(1, 20, 30)),
            (20, None, Terminator::Branch(40)),
            (30, None, Terminator::Branch(40)),
            (40, None, Terminator::Return),
        ]);
        let structure = structurize(&cfg.shapes()).unwrap();
        let nodes = &structure.body.nodes;
        assert_eq!(nodes.len(), 2);
        match nodes[0] {
            Node::If {
                block: 0,
                ref accept,
                ref reject,
            } => {
                assert_eq!(accept.nodes, vec![Node::Block(1)]);
                assert_eq!(reject.nodes, vec![Node::Block(2)]);
                assert_eq!(structure.scopes.parent(accept.scope), Some(0));
            }
            ref other => panic!("unexpected {other:?}"),
        }
        assert_eq!(nodes[1], Node::Return(3));
    }

    #[test]
    fn while_loop_with_continuing() {
        // 10: header, exits to 50 when %1 is false; 30 continues back.
        let cfg = Cfg(vec![
            (5, None, Terminator::Branch(10)),
            (
                10,
                Some(Merge::Loop {
                    merge: 50,
                    continuing: 30,
                }),
                cond(1, 20, 50),
            ),
            (20, None, Terminator::Branch(30)),
            (30, None, Terminator::Branch(10)),
            (50, None, Terminator::Return),
        ]);
        let structure = structurize(&cfg.shapes()).unwrap();
        let nodes = &structure.body.nodes;
        assert_eq!(nodes[0], Node::Block(0));
        match nodes[1] {
            Node::Loop {
                ref body,
                ref continuing,
            } => {
                assert_eq!(body.nodes.len(), 2);
                match body.nodes[0] {
                    Node::If {
                        block: 1,
                        ref accept,
                        ref reject,
                    } => {
                        assert!(accept.nodes.is_empty());
                        assert_eq!(reject.nodes, vec![Node::Break]);
                    }
                    ref other => panic!("unexpected {other:?}"),
                }
                assert_eq!(body.nodes[1], Node::Block(2));
                assert_eq!(continuing.nodes, vec![Node::Block(3)]);
                assert!(structure.scopes.crosses_continuing(continuing.scope, body.scope));
                assert_eq!(
                    structure.scopes.common_ancestor(continuing.scope, body.scope),
                    body.scope
                );
            }
            ref other => panic!("unexpected {other:?}"),
        }
        assert_eq!(nodes[2], Node::Return(4));
        assert_eq!(structure.block_scopes[1], structure.block_scopes[2]);
    }

    #[test]
    fn conditional_back_edge_is_break_if() {
        let cfg = Cfg(vec![
            (
                10,
                Some(Merge::Loop {
                    merge: 50,
                    continuing: 30,
                }),
                Terminator::Branch(30),
            ),
            (30, None, cond(2, 10, 50)),
            (50, None, Terminator::Return),
        ]);
        let structure = structurize(&cfg.shapes()).unwrap();
        match structure.body.nodes[0] {
            Node::Loop { ref continuing, .. } => {
                assert_eq!(
                    continuing.nodes,
                    vec![Node::BreakIf {
                        block: 1,
                        negate: true
                    }]
                );
            }
            ref other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn switch_cases_grouped_by_target() {
        let cfg = Cfg(vec![
            (
                10,
                Some(Merge::Selection(50)),
                Terminator::Switch {
                    selector: 1,
                    default: 50,
                    targets: vec![(1, 20), (2, 30), (3, 20)],
                },
            ),
            (20, None, Terminator::Branch(50)),
            (30, None, Terminator::Branch(50)),
            (50, None, Terminator::Return),
        ]);
        let structure = structurize(&cfg.shapes()).unwrap();
        match structure.body.nodes[0] {
            Node::Switch { ref cases, .. } => {
                assert_eq!(cases.len(), 3);
                assert_eq!(cases[0].literals, vec![1, 3]);
                assert_eq!(cases[1].literals, vec![2]);
                assert!(cases[2].default);
                assert!(cases[2].body.nodes.is_empty());
            }
            ref other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fallthrough_is_rejected() {
        let cfg = Cfg(vec![
            (
                10,
                Some(Merge::Selection(50)),
                Terminator::Switch {
                    selector: 1,
                    default: 50,
                    targets: vec![(1, 20), (2, 30)],
                },
            ),
            (20, None, Terminator::Branch(30)),
            (30, None, Terminator::Branch(50)),
            (50, None, Terminator::Return),
        ]);
        assert!(matches!(
            structurize(&cfg.shapes()),
            Err(Error::UnsupportedControlFlow(30, _))
        ));
    }
}
