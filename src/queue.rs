//! # Play Queue
//!
//! The ordered song list the playback controller walks through.
//!
//! ## Circular Advance
//!
//! The queue wraps: after the last song comes the first again. A position
//! that is unknown (nothing played yet, or the playing song is not part of
//! the queue) counts as "before the first song", so advancing from it lands
//! on index 0.
//!
//! The queue keeps recommendation order and never deduplicates. Positions are
//! tracked by index, so a song listed twice is played twice per cycle.

use crate::song::{RecommendationList, Song};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayQueue {
    songs: RecommendationList,
}

impl PlayQueue {
    pub fn new(songs: RecommendationList) -> Self {
        Self { songs }
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Song> {
        self.songs.get(index)
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    /// Index of the first entry with `song_id`.
    pub fn position_of(&self, song_id: &str) -> Option<usize> {
        self.songs.iter().position(|song| song.id == song_id)
    }

    /// Index that follows `current`, wrapping around. `None` on an empty queue.
    pub fn next_index(&self, current: Option<usize>) -> Option<usize> {
        next_index(current, self.songs.len())
    }
}

impl From<RecommendationList> for PlayQueue {
    fn from(songs: RecommendationList) -> Self {
        Self::new(songs)
    }
}

/// `(current + 1) % len`, treating an unknown position as `-1`.
pub fn next_index(current: Option<usize>, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(current.map_or(0, |index| (index + 1) % len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::EmotionLabel;
    use crate::testing::songs;

    #[test]
    fn test_next_index_wraps() {
        assert_eq!(next_index(Some(0), 3), Some(1));
        assert_eq!(next_index(Some(2), 3), Some(0));
        assert_eq!(next_index(Some(0), 1), Some(0));
    }

    #[test]
    fn test_unknown_position_starts_at_zero() {
        assert_eq!(next_index(None, 4), Some(0));
    }

    #[test]
    fn test_empty_queue_has_no_next() {
        assert_eq!(next_index(None, 0), None);
        assert_eq!(next_index(Some(3), 0), None);
        assert_eq!(PlayQueue::default().next_index(Some(0)), None);
    }

    #[test]
    fn test_full_cycle_visits_every_entry() {
        let queue = PlayQueue::new(songs(&["a", "b", "c", "d"], EmotionLabel::Calm));
        let mut index = None;
        let mut visited = Vec::new();
        for _ in 0..queue.len() {
            index = queue.next_index(index);
            visited.push(queue.get(index.unwrap()).unwrap().id.clone());
        }
        assert_eq!(visited, vec!["a", "b", "c", "d"]);
        assert_eq!(queue.next_index(index), Some(0));
    }

    #[test]
    fn test_position_of_finds_first_duplicate() {
        let queue = PlayQueue::from(songs(&["x", "y", "x"], EmotionLabel::Sad));
        assert_eq!(queue.position_of("x"), Some(0));
        assert_eq!(queue.position_of("y"), Some(1));
        assert_eq!(queue.position_of("z"), None);
        assert_eq!(queue.len(), 3);
    }
}
