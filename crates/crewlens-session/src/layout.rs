//! Force-directed positions for the interaction graph.
//!
//! A small velocity-Verlet simulation with link, many-body, collision and
//! centering forces. Parameters follow the usual d3-force conventions so a
//! browser renderer and a terminal renderer settle on similar pictures.
//! Initial placement is a phyllotaxis spiral, which keeps runs deterministic.

use crate::graph::GraphSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Simulation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutParams {
    /// Rest length of a link.
    pub link_distance: f64,
    /// Many-body strength; negative repels.
    pub charge: f64,
    /// Minimum spacing radius per node.
    pub collision_radius: f64,
    /// Viewport width; the centering force pulls toward `width / 2`.
    pub width: f64,
    /// Viewport height.
    pub height: f64,
    /// Per-tick decay of the cooling parameter.
    pub alpha_decay: f64,
    /// The simulation stops once alpha falls below this.
    pub alpha_min: f64,
    /// Fraction of velocity lost per tick.
    pub velocity_decay: f64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        let alpha_min: f64 = 0.001;
        Self {
            link_distance: 100.0,
            charge: -300.0,
            collision_radius: 30.0,
            width: 800.0,
            height: 600.0,
            // Cools from 1 to alpha_min in 300 ticks.
            alpha_decay: 1.0 - alpha_min.powf(1.0 / 300.0),
            alpha_min,
            velocity_decay: 0.4,
        }
    }
}

/// Final position of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    /// Node id.
    pub id: String,
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

#[derive(Debug, Clone)]
struct Body {
    id: String,
    x: f64,
    y: f64,
    vx: f64,
    vy: f64,
}

/// Incremental force layout; positions persist across [`sync`](Self::sync)
/// calls so nodes do not jump when the graph grows.
#[derive(Debug, Clone)]
pub struct ForceLayout {
    params: LayoutParams,
    bodies: Vec<Body>,
    links: Vec<(usize, usize)>,
    alpha: f64,
}

impl ForceLayout {
    /// Create an empty layout.
    pub fn new(params: LayoutParams) -> Self {
        Self {
            params,
            bodies: Vec::new(),
            links: Vec::new(),
            alpha: 1.0,
        }
    }

    /// Current cooling parameter.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Match bodies to the snapshot's nodes. New nodes are placed on the
    /// spiral and reheat the simulation; removed nodes are dropped.
    pub fn sync(&mut self, graph: &GraphSnapshot) {
        let previous: HashMap<String, Body> = self
            .bodies
            .drain(..)
            .map(|b| (b.id.clone(), b))
            .collect();
        let mut added = previous.len() != graph.nodes.len();

        let (cx, cy) = self.center();
        for (i, node) in graph.nodes.iter().enumerate() {
            match previous.get(&node.id) {
                Some(body) => self.bodies.push(body.clone()),
                None => {
                    added = true;
                    let radius = 10.0 * (0.5 + i as f64).sqrt();
                    let angle = i as f64 * std::f64::consts::PI * (3.0 - 5f64.sqrt());
                    self.bodies.push(Body {
                        id: node.id.clone(),
                        x: cx + radius * angle.cos(),
                        y: cy + radius * angle.sin(),
                        vx: 0.0,
                        vy: 0.0,
                    });
                }
            }
        }

        let index: HashMap<&str, usize> = self
            .bodies
            .iter()
            .enumerate()
            .map(|(i, b)| (b.id.as_str(), i))
            .collect();
        self.links = graph
            .links
            .iter()
            .filter_map(|l| Some((*index.get(l.source.as_str())?, *index.get(l.target.as_str())?)))
            .filter(|(s, t)| s != t)
            .collect();

        if added {
            self.alpha = 1.0;
        }
    }

    fn center(&self) -> (f64, f64) {
        (self.params.width / 2.0, self.params.height / 2.0)
    }

    /// Advance one step. Returns `false` once the simulation has cooled.
    pub fn tick(&mut self) -> bool {
        if self.alpha < self.params.alpha_min {
            return false;
        }
        self.alpha += (0.0 - self.alpha) * self.params.alpha_decay;

        self.apply_links();
        self.apply_charge();
        self.apply_collision();

        let keep = 1.0 - self.params.velocity_decay;
        for body in &mut self.bodies {
            body.vx *= keep;
            body.vy *= keep;
            body.x += body.vx;
            body.y += body.vy;
        }

        self.apply_centering();
        true
    }

    /// Sync with `graph` and tick until cool or `max_ticks` is reached.
    pub fn run(&mut self, graph: &GraphSnapshot, max_ticks: usize) -> Vec<NodePosition> {
        self.sync(graph);
        for _ in 0..max_ticks {
            if !self.tick() {
                break;
            }
        }
        self.positions()
    }

    /// Current positions in node order.
    pub fn positions(&self) -> Vec<NodePosition> {
        self.bodies
            .iter()
            .map(|b| NodePosition {
                id: b.id.clone(),
                x: b.x,
                y: b.y,
            })
            .collect()
    }

    fn apply_links(&mut self) {
        let mut degree = vec![0usize; self.bodies.len()];
        for (s, t) in &self.links {
            degree[*s] += 1;
            degree[*t] += 1;
        }

        for (i, (s, t)) in self.links.iter().copied().enumerate() {
            let (src, dst) = (&self.bodies[s], &self.bodies[t]);
            let mut dx = dst.x + dst.vx - src.x - src.vx;
            let mut dy = dst.y + dst.vy - src.y - src.vy;
            if dx == 0.0 && dy == 0.0 {
                (dx, dy) = (jiggle(i), jiggle(i + 1));
            }
            let len = (dx * dx + dy * dy).sqrt();
            let strength = 1.0 / degree[s].min(degree[t]) as f64;
            let pull = (len - self.params.link_distance) / len * self.alpha * strength;
            let (fx, fy) = (dx * pull, dy * pull);
            let bias = degree[s] as f64 / (degree[s] + degree[t]) as f64;

            self.bodies[t].vx -= fx * bias;
            self.bodies[t].vy -= fy * bias;
            self.bodies[s].vx += fx * (1.0 - bias);
            self.bodies[s].vy += fy * (1.0 - bias);
        }
    }

    fn apply_charge(&mut self) {
        let n = self.bodies.len();
        let mut delta = vec![(0.0, 0.0); n];
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let mut dx = self.bodies[j].x - self.bodies[i].x;
                let mut dy = self.bodies[j].y - self.bodies[i].y;
                if dx == 0.0 && dy == 0.0 {
                    (dx, dy) = (jiggle(i + j), jiggle(i * j + 1));
                }
                // Softened at distance 1 to keep coincident bodies finite.
                let dist2 = (dx * dx + dy * dy).max(1.0);
                let w = self.params.charge * self.alpha / dist2;
                delta[i].0 += dx * w;
                delta[i].1 += dy * w;
            }
        }
        for (body, (dvx, dvy)) in self.bodies.iter_mut().zip(delta) {
            body.vx += dvx;
            body.vy += dvy;
        }
    }

    fn apply_collision(&mut self) {
        let n = self.bodies.len();
        let min = self.params.collision_radius * 2.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (&self.bodies[i], &self.bodies[j]);
                let mut dx = (a.x + a.vx) - (b.x + b.vx);
                let mut dy = (a.y + a.vy) - (b.y + b.vy);
                let mut dist2 = dx * dx + dy * dy;
                if dist2 >= min * min {
                    continue;
                }
                if dist2 == 0.0 {
                    (dx, dy) = (jiggle(i), jiggle(j));
                    dist2 = dx * dx + dy * dy;
                }
                let dist = dist2.sqrt();
                let push = (min - dist) / dist * 0.5;
                self.bodies[i].vx += dx * push;
                self.bodies[i].vy += dy * push;
                self.bodies[j].vx -= dx * push;
                self.bodies[j].vy -= dy * push;
            }
        }
    }

    fn apply_centering(&mut self) {
        if self.bodies.is_empty() {
            return;
        }
        let n = self.bodies.len() as f64;
        let (sx, sy) = self
            .bodies
            .iter()
            .fold((0.0, 0.0), |(sx, sy), b| (sx + b.x, sy + b.y));
        let (cx, cy) = self.center();
        let (shift_x, shift_y) = (sx / n - cx, sy / n - cy);
        for body in &mut self.bodies {
            body.x -= shift_x;
            body.y -= shift_y;
        }
    }
}

impl Default for ForceLayout {
    fn default() -> Self {
        Self::new(LayoutParams::default())
    }
}

/// Tiny deterministic displacement for coincident points.
fn jiggle(seed: usize) -> f64 {
    ((seed % 7) as f64 + 1.0) * 1e-6
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::graph::InteractionGraph;

    fn chain() -> GraphSnapshot {
        let mut g = InteractionGraph::new();
        g.engage("Coordinator");
        g.engage("Project Manager");
        g.engage("Researcher");
        g.snapshot()
    }

    fn distance(a: &NodePosition, b: &NodePosition) -> f64 {
        ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
    }

    #[test]
    fn test_default_params() {
        let p = LayoutParams::default();
        assert_eq!(p.link_distance, 100.0);
        assert_eq!(p.charge, -300.0);
        assert_eq!(p.collision_radius, 30.0);
        assert!((p.alpha_decay - 0.0228).abs() < 0.001);
    }

    #[test]
    fn test_run_is_deterministic() {
        let graph = chain();
        let a = ForceLayout::default().run(&graph, 300);
        let b = ForceLayout::default().run(&graph, 300);
        assert_eq!(a, b);
    }

    #[test]
    fn test_layout_is_centered_and_spread() {
        let positions = ForceLayout::default().run(&chain(), 300);
        assert_eq!(positions.len(), 4);

        let n = positions.len() as f64;
        let cx = positions.iter().map(|p| p.x).sum::<f64>() / n;
        let cy = positions.iter().map(|p| p.y).sum::<f64>() / n;
        assert!((cx - 400.0).abs() < 1.0);
        assert!((cy - 300.0).abs() < 1.0);

        for (i, a) in positions.iter().enumerate() {
            for b in &positions[i + 1..] {
                assert!(distance(a, b) > 30.0, "{} and {} overlap", a.id, b.id);
            }
        }
    }

    #[test]
    fn test_simulation_cools_down() {
        let mut layout = ForceLayout::default();
        layout.sync(&chain());
        let mut ticks = 0;
        while layout.tick() {
            ticks += 1;
            assert!(ticks < 1000);
        }
        assert!(layout.alpha() < LayoutParams::default().alpha_min);
    }

    #[test]
    fn test_existing_positions_survive_sync() {
        let mut g = InteractionGraph::new();
        g.engage("A");
        let mut layout = ForceLayout::default();
        let before = layout.run(&g.snapshot(), 300);

        g.engage("B");
        layout.sync(&g.snapshot());
        let after = layout.positions();
        assert_eq!(after.len(), 3);
        assert_eq!(before[0], after[0]);
        assert_eq!(before[1], after[1]);
        assert_eq!(layout.alpha(), 1.0);
    }
}
