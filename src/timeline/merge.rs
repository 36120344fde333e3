//! Merging per-source events into one ordered timeline.
//!
//! Absolute events sort by timestamp with ties broken by source
//! registration order, then declared order. Relative events are placed
//! inside the bracket formed by the nearest absolute events of the same
//! source. Events without any temporal anchor go to the end.

use crate::core::types::{
    Confidence, EventPayload, EventTime, EvidenceSource, SourceEvent, SourceEvents, SourceId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Known limits on when an inferred event happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBounds {
    /// Not earlier than this
    pub after: Option<DateTime<Utc>>,
    /// Not later than this
    pub before: Option<DateTime<Utc>>,
}

impl TimeBounds {
    fn is_open(&self) -> bool {
        self.after.is_none() && self.before.is_none()
    }

    /// Whether a timestamp falls inside the bounds, inclusive.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.after.map_or(true, |a| ts >= a) && self.before.map_or(true, |b| ts <= b)
    }
}

/// One entry of the merged timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Zero-based position in the merged order
    pub position: usize,
    /// Exact or estimated time; `None` for approximate events
    pub timestamp: Option<DateTime<Utc>>,
    /// Time information as the source declared it
    pub declared: EventTime,
    /// Bracket the estimate was confined to, for inferred events
    pub bounds: Option<TimeBounds>,
    pub source: SourceId,
    pub payload: EventPayload,
    pub confidence: Confidence,
}

/// Merged timeline plus bookkeeping about what could not be placed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub events: Vec<TimelineEvent>,
    /// Events referencing sources that were never registered
    pub dropped: usize,
}

impl Timeline {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimelineEvent> {
        self.events.iter()
    }

    /// Events contributed by one source, in timeline order.
    pub fn for_source<'a>(&'a self, source: &'a SourceId) -> impl Iterator<Item = &'a TimelineEvent> {
        self.events.iter().filter(move |e| &e.source == source)
    }

    /// Number of events per confidence level. Every level is present.
    pub fn count_by_confidence(&self) -> BTreeMap<Confidence, usize> {
        let mut counts: BTreeMap<Confidence, usize> = [
            (Confidence::Certain, 0),
            (Confidence::Inferred, 0),
            (Confidence::Approximate, 0),
        ]
        .into_iter()
        .collect();
        for event in &self.events {
            *counts.entry(event.confidence).or_insert(0) += 1;
        }
        counts
    }
}

/// An event with its ordering coordinates, before final positions are assigned.
struct Placed {
    timestamp: Option<DateTime<Utc>>,
    registration: usize,
    declared_index: usize,
    event: SourceEvent,
    source: SourceId,
    bounds: Option<TimeBounds>,
    confidence: Confidence,
}

/// Merge per-source event sets into a single timeline.
///
/// `sources` is the registration order. Event sets for unregistered
/// sources are dropped and counted; several sets for the same source are
/// concatenated in the order given.
pub fn build_timeline(sources: &[EvidenceSource], events: Vec<SourceEvents>) -> Timeline {
    let registration: HashMap<&SourceId, usize> = sources
        .iter()
        .enumerate()
        .map(|(index, source)| (&source.id, index))
        .collect();

    let mut per_source: Vec<Vec<SourceEvent>> = vec![Vec::new(); sources.len()];
    let mut dropped = 0;

    for set in events {
        match registration.get(&set.source) {
            Some(&index) => per_source[index].extend(set.events),
            None => {
                log::warn!(
                    "Dropping {} events for unregistered source '{}'",
                    set.events.len(),
                    set.source
                );
                dropped += set.events.len();
            }
        }
    }

    let mut timed = Vec::new();
    let mut untimed = Vec::new();

    for (index, (source, declared)) in sources.iter().zip(per_source).enumerate() {
        for placed in place_source(index, source, declared) {
            if placed.timestamp.is_some() {
                timed.push(placed);
            } else {
                untimed.push(placed);
            }
        }
    }

    timed.sort_by(|a, b| {
        (a.timestamp, a.registration, a.declared_index).cmp(&(
            b.timestamp,
            b.registration,
            b.declared_index,
        ))
    });
    untimed.sort_by_key(|p| (p.registration, p.declared_index));

    fill_open_bounds(&mut timed);

    let events: Vec<TimelineEvent> = timed
        .into_iter()
        .chain(untimed)
        .enumerate()
        .map(|(position, placed)| TimelineEvent {
            position,
            timestamp: placed.timestamp,
            declared: placed.event.time,
            bounds: placed.bounds,
            source: placed.source,
            payload: placed.event.payload,
            confidence: placed.confidence,
        })
        .collect();

    log::debug!(
        "Timeline built: {} events from {} sources ({} dropped)",
        events.len(),
        sources.len(),
        dropped
    );

    Timeline { events, dropped }
}

/// Resolve every event of one source to a timestamp and confidence.
fn place_source(registration: usize, source: &EvidenceSource, events: Vec<SourceEvent>) -> Vec<Placed> {
    let absolute: Vec<Option<DateTime<Utc>>> = events
        .iter()
        .map(|e| match e.time {
            EventTime::Absolute(ts) => Some(ts),
            _ => None,
        })
        .collect();

    // Latest absolute timestamp declared before each index, and earliest
    // declared after it. Sources may declare absolute times out of order.
    let mut preceding = vec![None; events.len()];
    let mut latest: Option<DateTime<Utc>> = None;
    for (i, ts) in absolute.iter().enumerate() {
        latest = latest.max(*ts);
        preceding[i] = latest;
    }
    let mut following = vec![None; events.len()];
    let mut earliest: Option<DateTime<Utc>> = None;
    for (i, ts) in absolute.iter().enumerate().rev() {
        earliest = match (earliest, *ts) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        following[i] = earliest;
    }

    let mut placed = Vec::with_capacity(events.len());
    // Latest estimate in the current bracket, for monotone placement.
    let mut floor: Option<DateTime<Utc>> = None;

    for (i, event) in events.into_iter().enumerate() {
        let (timestamp, bounds, confidence) = match event.time {
            EventTime::Absolute(ts) => {
                floor = None;
                (Some(ts), None, Confidence::Certain)
            }
            EventTime::Offset(_) | EventTime::Sequence => {
                // An inverted bracket keeps only its lower edge, so the event
                // stays behind every certain event it was declared after.
                let bounds = TimeBounds {
                    after: preceding[i],
                    before: following[i].filter(|b| preceding[i].map_or(true, |a| a <= *b)),
                };
                let anchored = match (event.time, source.captured_at) {
                    (EventTime::Offset(offset), Some(captured)) => captured.checked_add_signed(offset),
                    _ => None,
                };

                let estimate = match anchored {
                    Some(raw) => Some(confine(raw, &bounds, floor)),
                    None => bounds
                        .after
                        .or(bounds.before)
                        .map(|edge| confine(edge, &bounds, floor)),
                };

                match estimate {
                    Some(ts) => {
                        floor = Some(ts);
                        let bounds = (!bounds.is_open()).then_some(bounds);
                        (Some(ts), bounds, Confidence::Inferred)
                    }
                    None => (None, None, Confidence::Approximate),
                }
            }
            EventTime::Unknown => (None, None, Confidence::Approximate),
        };

        placed.push(Placed {
            timestamp,
            registration,
            declared_index: i,
            event,
            source: source.id.clone(),
            bounds,
            confidence,
        });
    }

    placed
}

/// Clamp an estimate into its bracket without moving behind earlier estimates.
fn confine(
    raw: DateTime<Utc>,
    bounds: &TimeBounds,
    floor: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    let mut ts = raw;
    if let Some(after) = bounds.after {
        ts = ts.max(after);
    }
    if let Some(floor) = floor {
        ts = ts.max(floor);
    }
    if let Some(before) = bounds.before {
        ts = ts.min(before);
    }
    ts
}

/// Inferred events without a same-source bracket are bounded by the
/// nearest certain events around them in the merged order.
fn fill_open_bounds(timed: &mut [Placed]) {
    let certain: Vec<Option<DateTime<Utc>>> = timed
        .iter()
        .map(|p| (p.confidence == Confidence::Certain).then_some(p.timestamp).flatten())
        .collect();

    let mut before_each = vec![None; timed.len()];
    let mut last = None;
    for (i, ts) in certain.iter().enumerate() {
        before_each[i] = last;
        if ts.is_some() {
            last = *ts;
        }
    }
    let mut after_each = vec![None; timed.len()];
    let mut next = None;
    for (i, ts) in certain.iter().enumerate().rev() {
        after_each[i] = next;
        if ts.is_some() {
            next = *ts;
        }
    }

    for (i, placed) in timed.iter_mut().enumerate() {
        if placed.confidence == Confidence::Inferred && placed.bounds.is_none() {
            let bounds = TimeBounds {
                after: before_each[i],
                before: after_each[i],
            };
            placed.bounds = (!bounds.is_open()).then_some(bounds);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::MediumKind;
    use chrono::{Duration, TimeZone};

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn descriptions(timeline: &Timeline) -> Vec<String> {
        timeline
            .iter()
            .map(|e| match &e.payload {
                EventPayload::Description { text } => text.clone(),
                EventPayload::Indicator { key, .. } => key.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_relative_event_between_other_source_events() {
        let sources = vec![
            EvidenceSource::new("a", MediumKind::Network),
            EvidenceSource::new("b", MediumKind::Video).with_captured_at(t(0)),
        ];
        let timeline = build_timeline(
            &sources,
            vec![
                SourceEvents::new("a", vec![SourceEvent::at(t(10), "a-10"), SourceEvent::at(t(30), "a-30")]),
                SourceEvents::new("b", vec![SourceEvent::offset(Duration::seconds(20), "b-rel")]),
            ],
        );

        assert_eq!(descriptions(&timeline), vec!["a-10", "b-rel", "a-30"]);
        let b = &timeline.events[1];
        assert_eq!(b.confidence, Confidence::Inferred);
        let ts = b.timestamp.unwrap();
        assert!(ts >= t(10) && ts <= t(30));
        let bounds = b.bounds.unwrap();
        assert_eq!(bounds.after, Some(t(10)));
        assert_eq!(bounds.before, Some(t(30)));
        assert!(bounds.contains(ts));
    }

    #[test]
    fn test_relative_event_clamped_into_own_bracket() {
        let sources = vec![EvidenceSource::new("plc", MediumKind::Controller).with_captured_at(t(0))];
        let timeline = build_timeline(
            &sources,
            vec![SourceEvents::new(
                "plc",
                vec![
                    SourceEvent::at(t(10), "start"),
                    // Resolves far outside the bracket.
                    SourceEvent::offset(Duration::seconds(500), "setpoint change"),
                    SourceEvent::sequenced("alarm"),
                    SourceEvent::at(t(30), "stop"),
                ],
            )],
        );

        assert_eq!(
            descriptions(&timeline),
            vec!["start", "setpoint change", "alarm", "stop"]
        );
        let change = &timeline.events[1];
        assert_eq!(change.timestamp, Some(t(30)));
        assert_eq!(change.confidence, Confidence::Inferred);
        // Sequence events never move before an earlier estimate.
        assert_eq!(timeline.events[2].timestamp, Some(t(30)));
    }

    #[test]
    fn test_out_of_order_absolute_times_keep_inferred_after_predecessor() {
        let sources = vec![EvidenceSource::new("hmi", MediumKind::Controller)];
        let timeline = build_timeline(
            &sources,
            vec![SourceEvents::new(
                "hmi",
                vec![
                    SourceEvent::at(t(30), "late entry"),
                    SourceEvent::sequenced("operator ack"),
                    SourceEvent::at(t(10), "early entry"),
                ],
            )],
        );

        assert_eq!(
            descriptions(&timeline),
            vec!["early entry", "late entry", "operator ack"]
        );
        let ack = &timeline.events[2];
        assert_eq!(ack.confidence, Confidence::Inferred);
        let ts = ack.timestamp.unwrap();
        assert_eq!(ts, t(30));
        let bounds = ack.bounds.unwrap();
        assert_eq!(bounds.after, Some(t(30)));
        assert_eq!(bounds.before, None);
        assert!(bounds.contains(ts));
    }

    #[test]
    fn test_absolute_ties_use_registration_order() {
        let sources = vec![
            EvidenceSource::new("first", MediumKind::Memory),
            EvidenceSource::new("second", MediumKind::Network),
        ];
        let timeline = build_timeline(
            &sources,
            vec![
                SourceEvents::new("second", vec![SourceEvent::at(t(5), "second-5")]),
                SourceEvents::new("first", vec![SourceEvent::at(t(5), "first-5"), SourceEvent::at(t(1), "first-1")]),
            ],
        );

        assert_eq!(
            descriptions(&timeline),
            vec!["first-1", "first-5", "second-5"]
        );
        assert!(timeline.iter().all(|e| e.confidence == Confidence::Certain));
        assert_eq!(
            timeline.iter().map(|e| e.position).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_untimed_events_appended() {
        let sources = vec![
            EvidenceSource::new("cctv", MediumKind::Video),
            EvidenceSource::new("notes", MediumKind::Document),
        ];
        let timeline = build_timeline(
            &sources,
            vec![
                SourceEvents::new("notes", vec![SourceEvent::untimed("operator note"), SourceEvent::at(t(50), "shift change")]),
                SourceEvents::new("cctv", vec![SourceEvent::sequenced("figure at panel")]),
            ],
        );

        assert_eq!(
            descriptions(&timeline),
            vec!["shift change", "figure at panel", "operator note"]
        );
        assert_eq!(timeline.events[0].confidence, Confidence::Certain);
        // No capture time and no same-source bracket: nothing to anchor to.
        assert_eq!(timeline.events[1].confidence, Confidence::Approximate);
        assert_eq!(timeline.events[2].confidence, Confidence::Approximate);
        assert_eq!(timeline.events[2].timestamp, None);
    }

    #[test]
    fn test_unregistered_source_dropped() {
        let sources = vec![EvidenceSource::new("ram", MediumKind::Memory)];
        let timeline = build_timeline(
            &sources,
            vec![
                SourceEvents::new("ghost", vec![SourceEvent::at(t(1), "x"), SourceEvent::untimed("y")]),
                SourceEvents::new("ram", vec![SourceEvent::at(t(2), "z")]),
            ],
        );
        assert_eq!(timeline.dropped, 2);
        assert_eq!(timeline.len(), 1);
        assert!(timeline.iter().all(|e| e.source.as_str() == "ram"));
    }

    #[test]
    fn test_count_by_confidence() {
        let sources = vec![EvidenceSource::new("ram", MediumKind::Memory)];
        let timeline = build_timeline(
            &sources,
            vec![SourceEvents::new(
                "ram",
                vec![SourceEvent::at(t(1), "a"), SourceEvent::sequenced("b"), SourceEvent::untimed("c")],
            )],
        );
        let counts = timeline.count_by_confidence();
        assert_eq!(counts[&Confidence::Certain], 1);
        assert_eq!(counts[&Confidence::Inferred], 1);
        assert_eq!(counts[&Confidence::Approximate], 1);
    }

    #[test]
    fn test_deterministic() {
        let sources = vec![
            EvidenceSource::new("a", MediumKind::Network).with_captured_at(t(0)),
            EvidenceSource::new("b", MediumKind::Memory).with_captured_at(t(3)),
        ];
        let events = vec![
            SourceEvents::new("a", vec![SourceEvent::offset(Duration::seconds(4), "a1"), SourceEvent::at(t(4), "a2")]),
            SourceEvents::new("b", vec![SourceEvent::offset(Duration::seconds(1), "b1"), SourceEvent::untimed("b2")]),
        ];
        let first = build_timeline(&sources, events.clone());
        let second = build_timeline(&sources, events);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
