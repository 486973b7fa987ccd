use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::scraper::task::HotelLink;

/// A deployment-time misconfiguration of the shard parameters. Fatal at
/// startup; no partial run begins.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShardError {
    #[error("total_shards must be at least 1, got {0}")]
    InvalidTotal(usize),

    #[error("shard_index {index} out of range for {total} shards")]
    IndexOutOfRange { index: usize, total: usize },
}

/// Which contiguous slice of the global link list this instance owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardSpec {
    pub total_shards: usize,
    pub shard_index: usize,
}

impl ShardSpec {
    pub fn new(total_shards: usize, shard_index: usize) -> Result<Self, ShardError> {
        if total_shards == 0 {
            return Err(ShardError::InvalidTotal(total_shards));
        }
        if shard_index >= total_shards {
            return Err(ShardError::IndexOutOfRange {
                index: shard_index,
                total: total_shards,
            });
        }
        Ok(Self {
            total_shards,
            shard_index,
        })
    }

    /// Half-open `[start, end)` bounds of this shard's slice.
    ///
    /// `links_per_shard = ceil(total_links / total_shards)`, so every shard
    /// but possibly the last gets the same share and the union of all
    /// slices reconstructs the full list exactly.
    pub fn slice_bounds(&self, total_links: usize) -> (usize, usize) {
        let links_per_shard = total_links.div_ceil(self.total_shards);
        let start = (self.shard_index * links_per_shard).min(total_links);
        let end = (start + links_per_shard).min(total_links);
        (start, end)
    }

    /// Slice this shard's share out of the dated link list and attach the
    /// run-stable global index (`start + local_index`, 1-based) so
    /// identifiers stay consistent across shards.
    pub fn assign(&self, all_links: &[Url]) -> Vec<HotelLink> {
        let (start, end) = self.slice_bounds(all_links.len());
        all_links[start..end]
            .iter()
            .enumerate()
            .map(|(local_index, url)| HotelLink::new(url.clone(), start + local_index + 1))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(n: usize) -> Vec<Url> {
        (0..n)
            .map(|i| Url::parse(&format!("https://example.com/hotel/h{}.html", i)).unwrap())
            .collect()
    }

    #[test]
    fn rejects_zero_shards() {
        assert_eq!(ShardSpec::new(0, 0), Err(ShardError::InvalidTotal(0)));
    }

    #[test]
    fn rejects_out_of_range_index() {
        assert_eq!(
            ShardSpec::new(3, 3),
            Err(ShardError::IndexOutOfRange { index: 3, total: 3 })
        );
    }

    #[test]
    fn slices_are_disjoint_and_union_reconstructs_the_list() {
        for total_links in [0usize, 1, 5, 10, 17, 100] {
            for total_shards in [1usize, 2, 3, 7] {
                let all = links(total_links);
                let mut rebuilt = Vec::new();
                let mut previous_end = 0;

                for shard_index in 0..total_shards {
                    let spec = ShardSpec::new(total_shards, shard_index).unwrap();
                    let (start, end) = spec.slice_bounds(total_links);
                    assert_eq!(start, previous_end, "slices must be contiguous");
                    previous_end = end;
                    rebuilt.extend(spec.assign(&all));
                }

                assert_eq!(previous_end, total_links);
                assert_eq!(rebuilt.len(), total_links);
                for (i, link) in rebuilt.iter().enumerate() {
                    assert_eq!(link.global_index, i + 1);
                    assert_eq!(link.url, all[i]);
                }
            }
        }
    }

    #[test]
    fn global_index_is_stable_across_shard_counts() {
        let all = links(17);
        // Index of the 12th link must be 12 whether 2 or 5 shards process it
        for total_shards in [1usize, 2, 5] {
            for shard_index in 0..total_shards {
                let spec = ShardSpec::new(total_shards, shard_index).unwrap();
                for link in spec.assign(&all) {
                    assert_eq!(all[link.global_index - 1], link.url);
                }
            }
        }
    }

    #[test]
    fn ten_links_two_shards_split_one_to_five_and_six_to_ten() {
        let all = links(10);

        let first = ShardSpec::new(2, 0).unwrap().assign(&all);
        let second = ShardSpec::new(2, 1).unwrap().assign(&all);

        assert_eq!(
            first.iter().map(|l| l.global_index).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert_eq!(
            second.iter().map(|l| l.global_index).collect::<Vec<_>>(),
            vec![6, 7, 8, 9, 10]
        );
    }

    #[test]
    fn parameterized_links_keep_their_slot() {
        use crate::links::dates::{rewrite_links, StayWindow};
        use chrono::NaiveDate;

        let raw: Vec<String> = (0..10)
            .map(|i| {
                if i == 2 {
                    "https://example.com/hotel/h2.html?checkin=2025-04-17&checkout=2025-04-18".to_string()
                } else {
                    format!("https://example.com/hotel/h{}.html", i)
                }
            })
            .collect();
        let window = StayWindow {
            checkin: NaiveDate::from_ymd_opt(2025, 5, 10).unwrap(),
            checkout: NaiveDate::from_ymd_opt(2025, 5, 11).unwrap(),
        };

        let dated = rewrite_links(&raw, &window);
        let first = ShardSpec::new(2, 0).unwrap().assign(&dated);

        // The stale link sits at global index 3 on shard 0 with fresh dates
        assert_eq!(first[2].global_index, 3);
        assert!(first[2].url.as_str().contains("checkin=2025-05-10"));
        assert!(first[2].url.as_str().contains("checkout=2025-05-11"));
    }
}
