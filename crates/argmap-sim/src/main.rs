//! argmap simulator binary.
//!
//! Runs two collaborating sessions over in-memory replicas joined by a
//! relay, plays a scripted editing session (pair, fill, unpair, delete an
//! objected edge), checks that both replicas converged and prints the
//! final graph as JSON.
//!
//! Usage:
//!   cargo run -p argmap-sim
//!   cargo run -p argmap-sim -- --config engine.ron --save graph.json
//!   RUST_LOG=argmap_engine=debug cargo run -p argmap-sim

mod relay;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;

use argmap_crdt::{DocSnapshot, GraphDoc, MemoryDoc};
use argmap_engine::{
    Collaborators, Effect, EngineConfig, GraphSession, LayoutMeasure, LocalView, MeasuredLayout, Outcome,
    elect_leader,
};
use argmap_types::{Edge, GraphId, Node, OriginToken, PeerId, Position, Size, anchor_id};

/// Two-peer simulation of the argmap mutation engine.
#[derive(Parser, Debug)]
#[command(name = "argmap-sim")]
#[command(about = "Simulate two collaborating argmap clients")]
struct Args {
    /// Engine configuration (RON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the converged graph snapshot here
    #[arg(long)]
    save: Option<PathBuf>,

    /// Extra settle time after each step, in milliseconds
    #[arg(long, default_value_t = 20)]
    settle_ms: u64,
}

struct Peer {
    doc: Arc<MemoryDoc>,
    session: GraphSession,
    layout: Arc<MeasuredLayout>,
}

impl Peer {
    fn start(doc: Arc<MemoryDoc>, config: &EngineConfig) -> Self {
        let layout = Arc::new(MeasuredLayout::new());
        let collab = Collaborators {
            layout: Some(layout.clone() as Arc<dyn LayoutMeasure>),
            ..Default::default()
        };
        let session = GraphSession::new(doc.peer(), doc.clone(), config.clone(), collab);
        session.spawn_listener();
        Self { doc, session, layout }
    }

    /// Stand-in for the renderer: text nodes are taller the longer they are.
    fn measure_all(&self) {
        for node in self.session.view().nodes() {
            if let Some(text) = node.text() {
                let lines = (text.len() / 32 + 1) as f64;
                self.layout.record(node.id.clone(), Size::new(240.0, 24.0 * lines + 16.0));
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    argmap_telemetry::init_tracing("info");
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let settle = Duration::from_millis(args.settle_ms);

    let graph = GraphId::new();
    let doc_a = Arc::new(MemoryDoc::with_change_buffer(graph, PeerId::new(), config.change_buffer));
    let doc_b = Arc::new(MemoryDoc::with_change_buffer(graph, PeerId::new(), config.change_buffer));
    let relays = [
        relay::spawn_relay(doc_a.clone(), vec![doc_b.clone()]),
        relay::spawn_relay(doc_b.clone(), vec![doc_a.clone()]),
    ];

    seed(doc_a.as_ref());
    tokio::time::sleep(settle).await;

    let a = Peer::start(doc_a.clone(), &config);
    let b = Peer::start(doc_b.clone(), &config);
    let leader = elect_leader([a.doc.peer(), b.doc.peer()]).context("no peers")?;
    for peer in [&a, &b] {
        peer.session.set_leader(peer.doc.peer() == leader);
    }
    let (lead, follow) = if a.session.is_leader() { (&a, &b) } else { (&b, &a) };
    info!(leader = %leader.short(), "peers connected");

    // Leader pairs a point; the height sync needs rendered sizes.
    let created = lead.session.create_inverse_pair("p1")?;
    let Outcome::Applied(Effect::PairCreated { group_id, inverse_id, .. }) = &created else {
        bail!("pairing p1 was skipped: {created:?}");
    };
    lead.session
        .fill_inverse_content(inverse_id, Ok("The opposite may well be true.".to_string()))?;
    lead.measure_all();
    tokio::time::sleep(config.pair_height_delay() + settle).await;

    // The other peer unpairs it; both observe the closing phase.
    let closing = follow.session.remove_inverse_pair(inverse_id)?;
    info!(?closing, "remove requested");
    tokio::time::sleep(settle).await;
    if let Some(group) = lead.session.view().node(group_id) {
        info!(group = %group_id, closing = group.as_group().is_some_and(|g| g.closing), "leader sees pair");
    }
    tokio::time::sleep(config.closing_delay() + settle).await;

    // Deleting the objected edge takes its anchor and objection with it.
    let deleted = follow.session.delete("e1")?;
    info!(?deleted, "edge deleted");
    tokio::time::sleep(settle).await;

    for peer in [&a, &b] {
        peer.session.shutdown();
    }
    for relay in relays {
        relay.abort();
    }

    let (snap_a, snap_b) = (canonical(doc_a.snapshot()), canonical(doc_b.snapshot()));
    if (&snap_a.nodes, &snap_a.edges, &snap_a.texts) != (&snap_b.nodes, &snap_b.edges, &snap_b.texts) {
        bail!("replicas diverged");
    }
    info!(nodes = snap_a.nodes.len(), edges = snap_a.edges.len(), "replicas converged");

    if let Some(path) = &args.save {
        doc_a.save_to(path).with_context(|| format!("saving {}", path.display()))?;
        info!(path = %path.display(), "snapshot saved");
    }
    println!("{}", serde_json::to_string_pretty(&snap_a)?);
    Ok(())
}

/// Initial graph, written by a tool rather than either session.
fn seed(doc: &MemoryDoc) {
    let seeder = OriginToken::new();
    doc.transact(seeder, &mut |tx| {
        for (id, x, content) in [
            ("p1", 100.0, "Remote work raises productivity."),
            ("p2", 500.0, "Offices foster collaboration."),
        ] {
            tx.put_node(Node::point(id, Position::new(x, 100.0), content));
            tx.put_text(id, content.to_string());
        }
        tx.put_edge(Edge::negation("e1", "p1", "p2"));
        tx.put_node(Node::anchor("e1", Position::new(300.0, 100.0)));
        let objection = "Collaboration tools close the gap.";
        tx.put_node(Node::objection("o1", Position::new(300.0, 220.0), "e1", objection));
        tx.put_text("o1", objection.to_string());
        tx.put_edge(Edge::objection("oe1", "o1", "e1"));
    });
    info!(anchor = %anchor_id("e1"), "seeded graph");
}

/// Replicas insert in different orders; compare by id.
fn canonical(mut snapshot: DocSnapshot) -> DocSnapshot {
    snapshot.nodes.sort_by(|a, b| a.id.cmp(&b.id));
    snapshot.edges.sort_by(|a, b| a.id.cmp(&b.id));
    snapshot.texts.sort_keys();
    snapshot
}
