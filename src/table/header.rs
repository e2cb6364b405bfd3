//! Header search and selection.
//!
//! Every configured header definition is matched with the multi-line matcher;
//! each match becomes a [`BoundHeader`]. Bound headers are grouped by type and
//! combined (one per type per combination). Every combination is searched for
//! its largest collinear subset, and the resulting [`HeaderSelection`]s are
//! ranked by item count, supporting fragments below the header and the number
//! of items built from split fragments.

use crate::config::{TableConfig, OTHER};
use crate::geometry::{mean_angle_between, variance, BBox};
use crate::layout::{estimate_angle_from_boxes, Node, NodeArena, NodeChanges, NodeId};
use crate::matching::{Cartesian, MultiRowMatch};
use indexmap::IndexMap;
use std::collections::HashSet;

const ITEM_WEIGHT: i64 = 10_000;
const SUPPORT_WEIGHT: i64 = 100;

/// Width difference (px) below which two selections tie on width.
const WIDTH_TIE: f32 = 1.0;

/// Vertical distance (px) within which angle variance breaks ties.
const VARIANCE_TIE: f32 = 10.0;

/// Containment above which two fragments are the same text.
const SAME_FRAGMENT_IOO: f32 = 0.8;

/// Upper bound on raw combinations inspected.
const MAX_ENUMERATED: usize = 1 << 20;

/// A header definition bound to one concrete match.
#[derive(Debug, Clone)]
pub struct BoundHeader {
    /// Column name
    pub name: String,
    pub header_type: String,
    pub prime_key: bool,
    pub matched: MultiRowMatch,
    /// Discovered without a configured label
    pub auto: bool,
}

impl BoundHeader {
    pub fn bbox(&self) -> BBox {
        self.matched.bbox()
    }

    pub fn content(&self) -> String {
        self.matched.content()
    }

    pub fn is_other(&self) -> bool {
        self.header_type == OTHER
    }

    pub fn has_cut(&self) -> bool {
        self.matched.has_cut()
    }

    /// True when the two headers were built from the same fragments.
    pub fn conflicts_with(&self, other: &BoundHeader) -> bool {
        self.matched.nodes().any(|a| {
            other
                .matched
                .nodes()
                .any(|b| a.uid == b.uid || same_fragment(&a.bbox, &b.bbox))
        })
    }
}

fn same_fragment(a: &BBox, b: &BBox) -> bool {
    a.ioo(b) > SAME_FRAGMENT_IOO || b.ioo(a) > SAME_FRAGMENT_IOO
}

/// A collinear set of bound headers forming one table header row.
#[derive(Debug, Clone)]
pub struct HeaderSelection {
    /// Members, left to right
    pub headers: Vec<BoundHeader>,
    /// Estimated skew of the header line, in degrees
    pub angle: f32,
    /// Angles between horizontally consecutive members
    pub pair_angles: Vec<f32>,
    /// Non-header fragments below the members
    pub support: usize,
}

impl HeaderSelection {
    /// Build a selection; members are sorted left to right and the skew is
    /// estimated from their boxes.
    pub fn new(mut headers: Vec<BoundHeader>, fallback_angle: f32) -> Self {
        headers.sort_by(|a, b| a.bbox().left.total_cmp(&b.bbox().left));
        let boxes: Vec<BBox> = headers.iter().map(|h| h.bbox()).collect();
        let angle = estimate_angle_from_boxes(&boxes).unwrap_or(fallback_angle);
        let pair_angles = boxes.windows(2).map(|w| mean_angle_between(&w[0], &w[1])).collect();
        Self {
            headers,
            angle,
            pair_angles,
            support: 0,
        }
    }

    /// Union box of the members.
    pub fn bbox(&self) -> BBox {
        let boxes: Vec<BBox> = self.headers.iter().map(|h| h.bbox()).collect();
        BBox::merge_all(&boxes).unwrap_or_default()
    }

    /// Member texts, left to right.
    pub fn content(&self) -> String {
        self.headers
            .iter()
            .map(|h| h.content())
            .collect::<Vec<_>>()
            .join("|")
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Members built from split or leftover fragments.
    pub fn cut_count(&self) -> usize {
        self.headers.iter().filter(|h| h.has_cut()).count()
    }

    pub fn angle_variance(&self) -> f32 {
        variance(&self.pair_angles)
    }

    /// Ranking score: item count, then support, then fewer cut members.
    pub fn score(&self) -> i64 {
        self.headers.len() as i64 * ITEM_WEIGHT + self.support as i64 * SUPPORT_WEIGHT
            - self.cut_count() as i64
    }

    /// Average member node height.
    pub fn avg_height(&self) -> f32 {
        let heights: Vec<f32> = self.headers.iter().map(|h| h.matched.avg_height()).collect();
        if heights.is_empty() {
            0.0
        } else {
            heights.iter().sum::<f32>() / heights.len() as f32
        }
    }

    /// True when a member has the type.
    pub fn contains_type(&self, header_type: &str) -> bool {
        self.headers.iter().any(|h| h.header_type == header_type)
    }

    /// Ids of every node used by a member.
    pub fn node_ids(&self) -> HashSet<NodeId> {
        self.headers
            .iter()
            .flat_map(|h| h.matched.nodes().map(|n| n.uid.clone()))
            .collect()
    }

    /// True when the node belongs to the header, directly or as the
    /// unsplit original of a member piece.
    pub fn covers(&self, node: &Node) -> bool {
        self.headers.iter().any(|h| {
            h.matched
                .nodes()
                .any(|m| m.uid == node.uid || same_fragment(&m.bbox, &node.bbox))
        })
    }

    /// The working set after the members' merges and splits, with configured
    /// headers applied before prime-key headers.
    pub fn apply_to(&self, arena: &NodeArena) -> NodeArena {
        let mut out = arena.clone();
        let ordered = self
            .headers
            .iter()
            .filter(|h| !h.prime_key)
            .chain(self.headers.iter().filter(|h| h.prime_key));
        for header in ordered {
            out.apply(&header.matched.changes);
        }
        out
    }

    /// Every change proposed by the members.
    pub fn changes(&self) -> NodeChanges {
        let mut changes = NodeChanges::new();
        for h in &self.headers {
            changes.absorb(&h.matched.changes);
        }
        changes
    }

    /// Replace the members, keeping them sorted and refreshing the geometry.
    pub fn set_headers(&mut self, headers: Vec<BoundHeader>) {
        let support = self.support;
        let angle = self.angle;
        *self = HeaderSelection::new(headers, angle);
        self.support = support;
    }

    /// True when `self` ranks above `other`.
    fn better_than(&self, other: &HeaderSelection) -> bool {
        let (a, b) = (self.score(), other.score());
        if a != b {
            return a > b;
        }
        let (wa, wb) = (self.bbox().width(), other.bbox().width());
        if (wa - wb).abs() > WIDTH_TIE {
            return wa > wb;
        }
        if (self.bbox().cy() - other.bbox().cy()).abs() <= VARIANCE_TIE {
            return self.angle_variance() < other.angle_variance();
        }
        false
    }
}

/// Header search over one page.
pub struct HeaderDetector<'a> {
    config: &'a TableConfig,
}

impl<'a> HeaderDetector<'a> {
    pub fn new(config: &'a TableConfig) -> Self {
        Self { config }
    }

    /// Match every header definition. Prime-key definitions are searched last,
    /// over the page plus the leftover pieces of the other definitions' splits.
    pub fn search(&self, arena: &NodeArena) -> Vec<BoundHeader> {
        let limits = self.config.search.match_limits();
        let (primes, others): (Vec<_>, Vec<_>) = self
            .config
            .headers
            .iter()
            .partition(|d| self.config.is_prime_type(&d.header_type));

        let mut bound = Vec::new();
        let mut rest_pieces: Vec<Node> = Vec::new();
        for def in others {
            let matches = def.label().find(arena, &limits);
            log::debug!("header '{}': {} match(es)", def.name, matches.len());
            for m in matches {
                for piece in m.changes.cut_nodes() {
                    if !rest_pieces.iter().any(|r| r.bbox == piece.bbox) {
                        rest_pieces.push(piece.clone());
                    }
                }
                bound.push(BoundHeader {
                    name: def.name.clone(),
                    header_type: def.header_type.clone(),
                    prime_key: false,
                    matched: m,
                    auto: false,
                });
            }
        }

        let mut extended = arena.clone();
        for piece in rest_pieces {
            extended.insert(piece);
        }
        for def in primes {
            let matches = def.label().find(&extended, &limits);
            log::debug!("prime header '{}': {} match(es)", def.name, matches.len());
            for m in matches {
                bound.push(BoundHeader {
                    name: def.name.clone(),
                    header_type: def.header_type.clone(),
                    prime_key: true,
                    matched: m,
                    auto: false,
                });
            }
        }
        bound
    }

    /// Candidate combinations: one bound header per type (per definition for
    /// the catch-all type), at least two members, at least one prime key.
    /// Only the configured types are capped in number.
    /// Returned as index lists into `bound`.
    pub fn combinations(&self, bound: &[BoundHeader]) -> Vec<Vec<usize>> {
        let mut slots: IndexMap<String, Vec<usize>> = IndexMap::new();
        for (i, b) in bound.iter().enumerate() {
            let key = if b.is_other() {
                format!("{}:{}", OTHER, b.name)
            } else {
                b.header_type.clone()
            };
            slots.entry(key).or_default().push(i);
        }
        for (key, members) in slots.iter_mut() {
            members.sort_by(|&x, &y| {
                let (bx, by) = (bound[x].bbox(), bound[y].bbox());
                bound[x]
                    .matched
                    .distance
                    .cmp(&bound[y].matched.distance)
                    .then(bx.top.total_cmp(&by.top))
                    .then(bx.left.total_cmp(&by.left))
            });
            if bound[members[0]].is_other() {
                continue;
            }
            let cap = self.config.max_for_type(key);
            if members.len() > cap {
                log::debug!("type '{}': keeping {} of {} bound headers", key, cap, members.len());
                members.truncate(cap);
            }
        }

        let slots: Vec<Vec<usize>> = slots.into_values().collect();
        let sizes: Vec<usize> = slots.iter().map(|s| s.len()).collect();
        let cap = self.config.search.max_combinations;
        let mut combos: Vec<Vec<usize>> = Vec::new();
        for pick in Cartesian::new(&sizes).take(MAX_ENUMERATED) {
            let mut members: Vec<usize> = Vec::with_capacity(pick.len());
            for (slot, &k) in pick.iter().enumerate() {
                let candidate = slots[slot][k];
                match members.iter().position(|&m| bound[m].conflicts_with(&bound[candidate])) {
                    Some(pos) if bound[candidate].prime_key && !bound[members[pos]].prime_key => {
                        members[pos] = candidate;
                    },
                    Some(_) => {},
                    None => members.push(candidate),
                }
            }
            if members.len() < 2 || !members.iter().any(|&m| bound[m].prime_key) {
                continue;
            }
            members.sort_unstable();
            if combos.contains(&members) {
                continue;
            }
            combos.push(members);
            if combos.len() >= cap {
                log::warn!("header combinations capped at {}", cap);
                break;
            }
        }
        combos
    }

    /// Largest collinear subset of a combination.
    ///
    /// Every pair is tried as a baseline; other members join when their angle
    /// to the nearer baseline member agrees with the baseline angle. A steep
    /// baseline is kept only when it absorbs a combination of three or more.
    pub fn select_in(&self, members: &[&BoundHeader]) -> Option<HeaderSelection> {
        let n = members.len();
        let tolerance = self.config.search.pair_angle_tolerance;
        let boxes: Vec<BBox> = members.iter().map(|h| h.bbox()).collect();

        let mut best: Option<(Vec<usize>, f32)> = None;
        for i in 0..n {
            for j in (i + 1)..n {
                let base = mean_angle_between(&boxes[i], &boxes[j]);
                let mut absorbed = vec![i, j];
                for k in (0..n).filter(|&k| k != i && k != j) {
                    let di = (boxes[k].cx() - boxes[i].cx()).abs();
                    let dj = (boxes[k].cx() - boxes[j].cx()).abs();
                    let nearer = if di <= dj { i } else { j };
                    let angle = mean_angle_between(&boxes[k], &boxes[nearer]);
                    if (angle - base).abs() <= tolerance {
                        absorbed.push(k);
                    }
                }
                let absorbs_all = absorbed.len() == n && n >= 3;
                if base.abs() > self.config.search.angle_thresh && !absorbs_all {
                    log::trace!("baseline ({}, {}) at {:.1} degrees rejected", i, j, base);
                    continue;
                }
                if !absorbed.iter().any(|&k| members[k].prime_key) {
                    continue;
                }
                if best.as_ref().map_or(true, |(b, _)| absorbed.len() > b.len()) {
                    best = Some((absorbed, base));
                }
            }
        }

        let (absorbed, base) = best?;
        let headers = absorbed.iter().map(|&k| members[k].clone()).collect();
        Some(HeaderSelection::new(headers, base))
    }

    /// Non-header fragments below each member and within its horizontal extent.
    pub fn support(&self, selection: &HeaderSelection, arena: &NodeArena) -> usize {
        let candidates: Vec<&Node> = arena.iter().filter(|n| !selection.covers(n)).collect();
        selection
            .headers
            .iter()
            .map(|h| {
                let b = h.bbox();
                candidates
                    .iter()
                    .filter(|n| {
                        n.bbox.cy() > b.bottom && n.bbox.cx() >= b.left && n.bbox.cx() <= b.right
                    })
                    .count()
            })
            .sum()
    }

    /// Every distinct selection, scored.
    pub fn selections(&self, arena: &NodeArena) -> Vec<HeaderSelection> {
        let bound = self.search(arena);
        let combos = self.combinations(&bound);
        let mut selections: Vec<HeaderSelection> = Vec::new();
        for combo in combos {
            let members: Vec<&BoundHeader> = combo.iter().map(|&i| &bound[i]).collect();
            let Some(mut selection) = self.select_in(&members) else {
                continue;
            };
            let (bbox, content) = (selection.bbox(), selection.content());
            if selections.iter().any(|s| s.bbox() == bbox && s.content() == content) {
                continue;
            }
            selection.support = self.support(&selection, arena);
            selections.push(selection);
        }
        log::debug!(
            "{} bound header(s), {} distinct selection(s)",
            bound.len(),
            selections.len()
        );
        selections
    }

    /// The best selection, or `None` when no valid header exists.
    pub fn detect(&self, arena: &NodeArena) -> Option<HeaderSelection> {
        let mut best: Option<HeaderSelection> = None;
        for selection in self.selections(arena) {
            let replace = match &best {
                Some(current) => selection.better_than(current),
                None => true,
            };
            if replace {
                best = Some(selection);
            }
        }
        match &best {
            Some(s) => log::debug!(
                "selected header '{}' (score {}, angle {:.2})",
                s.content(),
                s.score(),
                s.angle
            ),
            None => log::debug!("no header selection"),
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HeaderDef, HeaderTypeDef, Label};
    use crate::matching::AlignPolicy;

    fn mock_node(id: &str, text: &str, x: f32, y: f32) -> Node {
        let w = 20.0 * text.chars().count() as f32;
        Node::new(id, text, BBox::new(x, y, x + w, y + 20.0))
    }

    fn mock_config(defs: &[(&str, &str, &str)], prime: &str) -> TableConfig {
        let mut types: Vec<HeaderTypeDef> = Vec::new();
        for (_, t, _) in defs {
            if *t != OTHER && !types.iter().any(|x| x.name == *t) {
                types.push(HeaderTypeDef {
                    name: t.to_string(),
                    prime_key: *t == prime,
                    max_candidates: None,
                });
            }
        }
        TableConfig {
            header_types: types,
            headers: defs
                .iter()
                .map(|(name, t, text)| HeaderDef {
                    name: name.to_string(),
                    header_type: t.to_string(),
                    rows: vec![vec![vec![Label::Text(text.to_string())]]],
                    alignment: AlignPolicy::default(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_detects_collinear_header() {
        let config = mock_config(&[("name", "NAME", "品名"), ("qty", "QTY", "数量")], "QTY");
        let arena = NodeArena::from_nodes(vec![
            mock_node("1", "品名", 0.0, 0.0),
            mock_node("2", "数量", 200.0, 1.0),
            mock_node("3", "螺丝", 0.0, 40.0),
            mock_node("4", "5", 210.0, 40.0),
        ]);
        let selection = HeaderDetector::new(&config).detect(&arena).unwrap();
        assert_eq!(selection.len(), 2);
        assert_eq!(selection.headers[0].name, "name");
        assert_eq!(selection.support, 2);
    }

    #[test]
    fn test_requires_prime_key() {
        let config = mock_config(&[("name", "NAME", "品名"), ("qty", "QTY", "数量")], "QTY");
        let arena = NodeArena::from_nodes(vec![
            mock_node("1", "品名", 0.0, 0.0),
            mock_node("2", "单价", 200.0, 0.0),
        ]);
        assert!(HeaderDetector::new(&config).detect(&arena).is_none());
    }

    #[test]
    fn test_combinations_are_deterministic() {
        let config = mock_config(&[("name", "NAME", "品名"), ("qty", "QTY", "数量")], "QTY");
        let arena = NodeArena::from_nodes(vec![
            mock_node("1", "品名", 0.0, 0.0),
            mock_node("2", "数量", 200.0, 0.0),
            mock_node("3", "数量", 200.0, 300.0),
        ]);
        let detector = HeaderDetector::new(&config);
        let bound = detector.search(&arena);
        let a = detector.combinations(&bound);
        let b = detector.combinations(&bound);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_catch_all_slots_are_not_capped() {
        let mut config = mock_config(&[("qty", "QTY", "数量"), ("remark", OTHER, "备注")], "QTY");
        config.search.max_per_type = 1;
        let arena = NodeArena::from_nodes(vec![
            mock_node("1", "数量", 0.0, 0.0),
            mock_node("2", "数量", 0.0, 300.0),
            mock_node("3", "备注", 200.0, 0.0),
            mock_node("4", "备注", 200.0, 100.0),
            mock_node("5", "备注", 200.0, 200.0),
        ]);
        let detector = HeaderDetector::new(&config);
        let combos = detector.combinations(&detector.search(&arena));
        assert_eq!(combos.len(), 3);
        assert!(combos.iter().all(|c| c.len() == 2));
    }

    #[test]
    fn test_steep_pair_needs_three_members() {
        let config = mock_config(&[("name", "NAME", "品名"), ("qty", "QTY", "数量")], "QTY");
        let detector = HeaderDetector::new(&config);
        // 100 px right, 60 px down: about 31 degrees
        let arena = NodeArena::from_nodes(vec![
            mock_node("1", "品名", 0.0, 0.0),
            mock_node("2", "数量", 100.0, 60.0),
        ]);
        assert!(detector.detect(&arena).is_none());
    }

    #[test]
    fn test_prime_search_sees_split_leftovers() {
        let mut config = mock_config(&[("name", "NAME", "品名")], "QTY");
        config.header_types.push(HeaderTypeDef {
            name: "QTY".into(),
            prime_key: true,
            max_candidates: None,
        });
        config.headers[0].rows = vec![vec![vec![Label::Spec(crate::config::LabelSpec {
            text: "品名".into(),
            mode: crate::matching::MatchMode::HSplit,
            ed_thresh: -1,
            max_interval: 1,
            strip_symbols: true,
            strip_spaces: true,
            preprocess: None,
        })]]];
        config.headers.push(HeaderDef {
            name: "qty".into(),
            header_type: "QTY".into(),
            rows: vec![vec![vec![Label::Text("数量".into())]]],
            alignment: AlignPolicy::default(),
        });
        let arena = NodeArena::from_nodes(vec![mock_node("1", "品名数量", 0.0, 0.0)]);
        let selection = HeaderDetector::new(&config).detect(&arena).unwrap();
        assert_eq!(selection.content(), "品名|数量");
        assert_eq!(selection.cut_count(), 2);
        let working = selection.apply_to(&arena);
        assert!(!working.contains(&NodeId::new("1")));
        assert_eq!(working.len(), 2);
    }
}
