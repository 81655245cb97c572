//! Pairing of per-interval scene selections across the two catalogs.

use crate::core::coverage::select_coverage;
use crate::events::{Event, EventKind, EventSink};
use crate::types::{Footprint, Product, SeriesPair, TimeInterval};

/// Plans the paired time series: for every interval, selects covering
/// scene sets from both catalogs independently and keeps the interval
/// only when both selections are complete.
pub struct SeriesPlanner<'a> {
    aoi: &'a Footprint,
    min_coverage: f64,
    sink: &'a dyn EventSink,
}

impl<'a> SeriesPlanner<'a> {
    pub fn new(aoi: &'a Footprint, min_coverage: f64, sink: &'a dyn EventSink) -> Self {
        SeriesPlanner {
            aoi,
            min_coverage,
            sink,
        }
    }

    /// Products whose acquisition timestamp falls inside the interval
    /// (inclusive bounds, see `TimeInterval::contains`).
    fn products_in_interval(products: &[Product], interval: &TimeInterval) -> Vec<Product> {
        products
            .iter()
            .filter(|p| interval.contains(p.acquired))
            .cloned()
            .collect()
    }

    /// Runs the coverage selector per interval and per source.
    ///
    /// An interval with an incomplete selection on either source is
    /// dropped entirely; there is no single-source output. Every drop is
    /// surfaced through the event sink.
    pub fn plan(
        &self,
        intervals: &[TimeInterval],
        s2_catalog: &[Product],
        s1_catalog: &[Product],
    ) -> Vec<SeriesPair> {
        let mut pairs = Vec::new();

        for interval in intervals {
            let s2_candidates = Self::products_in_interval(s2_catalog, interval);
            let s1_candidates = Self::products_in_interval(s1_catalog, interval);
            log::debug!(
                "{}: {} S2 and {} S1 candidate products",
                interval,
                s2_candidates.len(),
                s1_candidates.len()
            );

            let s2 = select_coverage(&s2_candidates, self.aoi, self.min_coverage);
            let s1 = select_coverage(&s1_candidates, self.aoi, self.min_coverage);

            if s2.complete && s1.complete {
                self.sink.emit(
                    Event::new(
                        EventKind::IntervalAccepted,
                        format!(
                            "{} S2 and {} S1 scenes selected",
                            s2.products.len(),
                            s1.products.len()
                        ),
                    )
                    .with_interval(interval.label()),
                );
                pairs.push(SeriesPair {
                    interval: *interval,
                    s2,
                    s1,
                });
            } else {
                let mut missing = Vec::new();
                for (source, result) in [("S2", &s2), ("S1", &s1)] {
                    if !result.complete {
                        missing.push(source);
                        self.sink.emit(
                            Event::new(
                                EventKind::CoverageIncomplete,
                                format!(
                                    "{}: {} candidate scenes left an AOI gap",
                                    source,
                                    result.products.len()
                                ),
                            )
                            .with_interval(interval.label()),
                        );
                    }
                }
                self.sink.emit(
                    Event::new(
                        EventKind::IntervalSkipped,
                        format!("incomplete AOI coverage for {}", missing.join(" and ")),
                    )
                    .with_interval(interval.label()),
                );
            }
        }

        log::info!(
            "Series planning kept {} of {} intervals",
            pairs.len(),
            intervals.len()
        );
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use chrono::{TimeZone, Utc};

    fn product(id: &str, day: u32, wkt: &str, cloud: Option<f64>) -> Product {
        Product {
            id: id.to_string(),
            title: id.to_string(),
            footprint: Footprint::from_wkt(wkt).unwrap(),
            acquired: Utc.with_ymd_and_hms(2020, 1, day, 12, 0, 0).unwrap(),
            cloud_cover: cloud,
            size_bytes: 0,
        }
    }

    fn intervals() -> Vec<TimeInterval> {
        vec![
            TimeInterval {
                start: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2020, 1, 15, 0, 0, 0).unwrap(),
            },
            TimeInterval {
                start: Utc.with_ymd_and_hms(2020, 1, 15, 0, 0, 0).unwrap(),
                end: Utc.with_ymd_and_hms(2020, 1, 29, 0, 0, 0).unwrap(),
            },
        ]
    }

    const FULL: &str = "POLYGON((-1 -1,11 -1,11 11,-1 11,-1 -1))";

    #[test]
    fn test_interval_kept_only_when_both_sources_cover() {
        let aoi = Footprint::from_wkt("POLYGON((0 0,10 0,10 10,0 10,0 0))").unwrap();
        let sink = MemorySink::new();
        let planner = SeriesPlanner::new(&aoi, 0.9, &sink);

        // First interval: both sources cover. Second: only S2 has a scene.
        let s2 = vec![
            product("s2-a", 5, FULL, Some(3.0)),
            product("s2-b", 20, FULL, Some(8.0)),
        ];
        let s1 = vec![product("s1-a", 6, FULL, None)];

        let pairs = planner.plan(&intervals(), &s2, &s1);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].s2.products[0].id, "s2-a");
        assert_eq!(pairs[0].s1.products[0].id, "s1-a");
        assert_eq!(sink.count(crate::events::EventKind::IntervalSkipped), 1);
        assert_eq!(sink.count(crate::events::EventKind::IntervalAccepted), 1);
    }

    #[test]
    fn test_products_filtered_by_acquisition_time() {
        let aoi = Footprint::from_wkt("POLYGON((0 0,10 0,10 10,0 10,0 0))").unwrap();
        let sink = MemorySink::new();
        let planner = SeriesPlanner::new(&aoi, 0.9, &sink);

        // Scene from the second interval must not satisfy the first
        let s2 = vec![product("late", 20, FULL, Some(1.0))];
        let s1 = vec![product("early", 2, FULL, None)];
        let pairs = planner.plan(&intervals(), &s2, &s1);
        assert!(pairs.is_empty());
        assert_eq!(sink.count(crate::events::EventKind::IntervalSkipped), 2);
    }
}
