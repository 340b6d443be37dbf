/// Module for computing analytical metrics to evaluate obfuscation passes.
///
/// Each method body is split into basic blocks and turned into a control-flow graph with
/// synthetic entry and exit nodes. From that graph the module derives block and edge counts,
/// dominator/post-dominator overlap and a composite potency score; program-level metrics are
/// the sum over every method with a body.
///
/// # Usage
/// ```rust,ignore
/// let before = metrics::collect_metrics(&bundle.program);
/// pass.apply(&mut bundle, &mut rng)?;
/// let after = metrics::collect_metrics(&bundle.program);
/// println!("potency delta: {:+.2}", metrics::compare(&before, &after));
/// ```
use classcloak_core::insn::Instruction;
use classcloak_core::program::{MethodDef, Program};
use classcloak_core::Label;
use classcloak_utils::errors::MetricsError;
use petgraph::{
    algo::dominators::simple_fast,
    graph::{DiGraph, NodeIndex},
    visit::Reversed,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Node of a method control-flow graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Entry,
    /// Basic block covering `start..end` of the instruction list.
    Body { start: usize, end: usize },
    Exit,
}

/// Kind of control transfer along an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeType {
    Fallthrough,
    Jump,
    Exception,
    Return,
}

/// Control-flow graph of one method body.
#[derive(Debug, Clone)]
pub struct MethodCfg {
    pub graph: DiGraph<Block, EdgeType>,
    pub entry: NodeIndex,
    pub exit: NodeIndex,
}

/// Analytical metrics for one method or a whole program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Executable instructions, excluding label markers.
    pub insn_cnt: usize,
    /// Basic blocks (excluding Entry/Exit).
    pub block_cnt: usize,
    /// Edges in the CFG.
    pub edge_cnt: usize,
    /// Exception regions.
    pub handler_cnt: usize,
    /// Fraction of nodes whose immediate dominator equals their immediate post-dominator.
    pub dom_overlap: f64,
    /// Composite potency score (heuristic based on nodes, edges, and overlap).
    pub potency: f64,
}

/// Splits a method body into basic blocks and links them.
///
/// Leaders are the first instruction, every label that is a jump target or
/// handler entry, and every instruction following a branch or terminator.
pub fn build_cfg(method: &MethodDef) -> Result<MethodCfg, MetricsError> {
    let insns = &method.instructions;
    if insns.iter().all(Instruction::is_marker) {
        return Err(MetricsError::EmptyBody(method.name.clone()));
    }

    let mut label_at: HashMap<Label, usize> = HashMap::new();
    for (i, insn) in insns.iter().enumerate() {
        if let Instruction::Label(l) = insn {
            label_at.insert(*l, i);
        }
    }

    let mut leaders = vec![false; insns.len() + 1];
    leaders[0] = true;
    for (i, insn) in insns.iter().enumerate() {
        let targets = insn.targets();
        if !targets.is_empty() || !insn.falls_through() {
            leaders[i + 1] = true;
        }
        for t in targets {
            if let Some(&at) = label_at.get(&t) {
                leaders[at] = true;
            }
        }
    }
    for region in &method.exception_regions {
        for l in [region.start, region.end, region.handler] {
            if let Some(&at) = label_at.get(&l) {
                leaders[at] = true;
            }
        }
    }

    let mut graph = DiGraph::new();
    let entry = graph.add_node(Block::Entry);
    let mut block_of = vec![NodeIndex::end(); insns.len()];
    let mut blocks = Vec::new();
    let mut start = 0;
    for end in 1..=insns.len() {
        if leaders[end] || end == insns.len() {
            let node = graph.add_node(Block::Body { start, end });
            block_of[start..end].fill(node);
            blocks.push((node, start, end));
            start = end;
        }
    }
    let exit = graph.add_node(Block::Exit);

    graph.add_edge(entry, blocks[0].0, EdgeType::Fallthrough);
    for (idx, &(node, _, end)) in blocks.iter().enumerate() {
        let last = insns[..end]
            .iter()
            .rev()
            .take(end - blocks[idx].1)
            .find(|i| !i.is_marker());
        let falls = last.is_none_or(Instruction::falls_through);
        if let Some(insn) = last {
            for t in insn.targets() {
                if let Some(&at) = label_at.get(&t) {
                    graph.add_edge(node, block_of[at], EdgeType::Jump);
                }
            }
            if !insn.falls_through() && insn.targets().is_empty() {
                graph.add_edge(node, exit, EdgeType::Return);
            }
        }
        if falls {
            match blocks.get(idx + 1) {
                Some(&(next, _, _)) => {
                    graph.add_edge(node, next, EdgeType::Fallthrough);
                }
                None => {
                    graph.add_edge(node, exit, EdgeType::Return);
                }
            }
        }
    }

    for region in &method.exception_regions {
        let (Some(&s), Some(&e), Some(&h)) = (
            label_at.get(&region.start),
            label_at.get(&region.end),
            label_at.get(&region.handler),
        ) else {
            continue;
        };
        let handler = block_of[h];
        let mut covered: Vec<NodeIndex> = block_of[s..e.max(s)].to_vec();
        covered.dedup();
        for node in covered {
            graph.add_edge(node, handler, EdgeType::Exception);
        }
    }

    Ok(MethodCfg { graph, entry, exit })
}

/// Collects metrics for a single method body.
pub fn method_metrics(method: &MethodDef) -> Result<Metrics, MetricsError> {
    let cfg = build_cfg(method)?;
    let (doms, post_doms) = dominator_pairs(&cfg);
    let overlap = dom_overlap(&doms, &post_doms);
    let block_cnt = cfg.graph.node_count() - 2;
    let edge_cnt = cfg.graph.edge_count();
    Ok(Metrics {
        insn_cnt: method.instruction_count(),
        block_cnt,
        edge_cnt,
        handler_cnt: method.exception_regions.len(),
        dom_overlap: overlap,
        potency: score(overlap, block_cnt, edge_cnt),
    })
}

/// Collects metrics for every method body in the program and sums them.
///
/// `dom_overlap` is averaged over methods; everything else is summed.
pub fn collect_metrics(program: &Program) -> Metrics {
    let mut total = Metrics::default();
    let mut methods = 0usize;
    for method in program.types().flat_map(|t| t.methods.iter()) {
        let Ok(m) = method_metrics(method) else {
            continue;
        };
        methods += 1;
        total.insn_cnt += m.insn_cnt;
        total.block_cnt += m.block_cnt;
        total.edge_cnt += m.edge_cnt;
        total.handler_cnt += m.handler_cnt;
        total.dom_overlap += m.dom_overlap;
        total.potency += m.potency;
    }
    if methods > 0 {
        total.dom_overlap /= methods as f64;
    }
    total
}

type DominatorMap = HashMap<NodeIndex, NodeIndex>;

/// Computes immediate dominator and post-dominator maps, rooted at the entry
/// and exit nodes respectively.
fn dominator_pairs(cfg: &MethodCfg) -> (DominatorMap, DominatorMap) {
    let g = &cfg.graph;
    let doms = simple_fast(g, cfg.entry);
    let mut dom_map = HashMap::new();
    for n in g.node_indices() {
        if let Some(idom) = doms.immediate_dominator(n) {
            dom_map.insert(n, idom);
        }
    }

    let post = simple_fast(Reversed(g), cfg.exit);
    let mut pdom_map = HashMap::new();
    for n in g.node_indices() {
        if let Some(ipdom) = post.immediate_dominator(n) {
            pdom_map.insert(n, ipdom);
        }
    }

    (dom_map, pdom_map)
}

fn dom_overlap(doms: &DominatorMap, pdoms: &DominatorMap) -> f64 {
    let common = doms
        .iter()
        .filter(|(n, d)| pdoms.get(*n) == Some(*d))
        .count();
    if doms.is_empty() {
        0.0
    } else {
        common as f64 / doms.len() as f64
    }
}

/// Potency heuristic: rewards blocks and edges, penalizes dominator overlap
/// (a high overlap means a mostly linear graph).
fn score(overlap: f64, nodes: usize, edges: usize) -> f64 {
    5.0 * (nodes.max(1) as f64).log2() + edges as f64 + 30.0 * (1.0 - overlap)
}

/// Compares two sets of metrics to evaluate a pass.
///
/// Positive results mean the pass increased complexity; instruction growth is
/// penalized lightly.
pub fn compare(before: &Metrics, after: &Metrics) -> f64 {
    after.potency - before.potency - 0.01 * (after.insn_cnt as f64 - before.insn_cnt as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use classcloak_core::insn::{JumpCond, Op, VarOp};
    use classcloak_core::program::ExceptionRegion;
    use classcloak_core::AccessFlags;

    fn method(instructions: Vec<Instruction>) -> MethodDef {
        MethodDef {
            name: "m".into(),
            desc: "(I)I".into(),
            access: AccessFlags::STATIC,
            max_locals: 1,
            max_stack: 2,
            instructions,
            exception_regions: Vec::new(),
        }
    }

    /// A straight-line body is a single block.
    #[test]
    fn test_metrics_linear() {
        let m = method(vec![
            Instruction::load(VarOp::ILoad, 0),
            Instruction::push_int(1),
            Instruction::op(Op::IAdd),
            Instruction::op(Op::IReturn),
        ]);
        let metrics = method_metrics(&m).expect("Metrics computation failed");
        assert_eq!(metrics.block_cnt, 1, "Block count mismatch");
        assert_eq!(metrics.edge_cnt, 2, "Edge count mismatch");
        assert_eq!(metrics.insn_cnt, 4);
        assert!(metrics.potency > 0.0, "Potency score should be positive");
    }

    /// A conditional branch yields a diamond-ish graph with more edges.
    #[test]
    fn test_metrics_branching() {
        let m = method(vec![
            Instruction::load(VarOp::ILoad, 0),
            Instruction::jump(JumpCond::IfEq, Label(0)),
            Instruction::push_int(1),
            Instruction::op(Op::IReturn),
            Instruction::Label(Label(0)),
            Instruction::push_int(2),
            Instruction::op(Op::IReturn),
        ]);
        let metrics = method_metrics(&m).unwrap();
        assert_eq!(metrics.block_cnt, 3, "Block count mismatch");
        assert_eq!(metrics.edge_cnt, 5, "Edge count mismatch");
        assert!(
            metrics.dom_overlap >= 0.0 && metrics.dom_overlap <= 1.0,
            "Invalid overlap"
        );
    }

    #[test]
    fn test_exception_edges() {
        let mut m = method(vec![
            Instruction::Label(Label(0)),
            Instruction::load(VarOp::ILoad, 0),
            Instruction::push_int(0),
            Instruction::op(Op::IDiv),
            Instruction::op(Op::IReturn),
            Instruction::Label(Label(1)),
            Instruction::Label(Label(2)),
            Instruction::op(Op::Pop),
            Instruction::push_int(-1),
            Instruction::op(Op::IReturn),
        ]);
        m.exception_regions.push(ExceptionRegion {
            start: Label(0),
            end: Label(1),
            handler: Label(2),
            catch_type: None,
        });
        let cfg = build_cfg(&m).unwrap();
        let exception_edges = cfg
            .graph
            .edge_weights()
            .filter(|e| **e == EdgeType::Exception)
            .count();
        assert_eq!(exception_edges, 1);
        assert_eq!(method_metrics(&m).unwrap().handler_cnt, 1);
    }

    #[test]
    fn test_empty_body_rejected() {
        let m = method(vec![Instruction::Label(Label(0))]);
        assert!(build_cfg(&m).is_err());
        let program = Program::new();
        assert_eq!(collect_metrics(&program), Metrics::default());
    }
}
