use async_trait::async_trait;
use classcloak_analysis::metrics::{Block, EdgeType, MethodCfg, build_cfg};
use classcloak_core::program::MethodDef;
use clap::Args;
use std::error::Error;
use std::fmt::Write as _;
use std::path::PathBuf;

#[derive(Args)]
pub struct CfgArgs {
    /// Input archive
    #[arg(short, long)]
    input: PathBuf,
    /// Owning type, dotted or internal form
    #[arg(short, long)]
    class: String,
    /// Method name
    #[arg(short, long)]
    method: String,
    /// Method descriptor, when the name is overloaded
    #[arg(short, long)]
    desc: Option<String>,
    /// Output file for Graphviz .dot (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[async_trait]
impl super::Command for CfgArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let archive = super::load_archive(&self.input).await?;
        let class = self.class.replace('.', "/");
        let ty = archive
            .bundle
            .program
            .get(&class)
            .ok_or_else(|| format!("no type {class} in {}", self.input.display()))?;
        let method = ty
            .methods
            .iter()
            .find(|m| m.name == self.method && self.desc.as_ref().is_none_or(|d| *d == m.desc))
            .ok_or_else(|| format!("no method {} in {class}", self.method))?;

        let cfg = build_cfg(method)?;
        let dot = generate_dot(method, &cfg);
        if let Some(out_path) = self.output {
            tokio::fs::write(out_path, &dot).await?;
        } else {
            println!("{dot}");
        }
        Ok(())
    }
}

fn generate_dot(method: &MethodDef, cfg: &MethodCfg) -> String {
    let mut dot = String::from("digraph CFG {\n");

    for node in cfg.graph.node_indices() {
        let label = match &cfg.graph[node] {
            Block::Entry => "Entry".to_string(),
            Block::Exit => "Exit".to_string(),
            Block::Body { start, end } => {
                let instrs: Vec<String> = method.instructions[*start..*end]
                    .iter()
                    .map(|i| format!("{i:?}").replace('"', "\\\""))
                    .collect();
                format!("Block_{}\\n{}", start, instrs.join("\\n"))
            }
        };
        let _ = writeln!(dot, "    {} [label=\"{}\"];", node.index(), label);
    }

    for edge in cfg.graph.edge_indices() {
        let Some((src, dst)) = cfg.graph.edge_endpoints(edge) else {
            continue;
        };
        let label = match cfg.graph[edge] {
            EdgeType::Fallthrough => "Fallthrough",
            EdgeType::Jump => "Jump",
            EdgeType::Exception => "Exception",
            EdgeType::Return => "Return",
        };
        let _ = writeln!(
            dot,
            "    {} -> {} [label=\"{}\"];",
            src.index(),
            dst.index(),
            label
        );
    }

    dot.push_str("}\n");
    dot
}
