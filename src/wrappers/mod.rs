// Wrappers for Env composition.

use crate::core::{Env, Info, Result, Step};

/// Summary of one finished episode.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EpisodeStats {
    pub episode_return: f64,
    pub length: i64,
    pub unsafe_steps: i64,
}

/// RecordSafetyStatistics tracks cumulative return, episode length and the number
/// of steps flagged `unsafe` by the inner environment.
/// On episode end (terminated or truncated), it injects keys into the returned Step's Info:
/// - "episode_return": f64
/// - "episode_length": i64
/// - "episode_unsafe_steps": i64
pub struct RecordSafetyStatistics<E: Env> {
    inner: E,
    current: EpisodeStats,
    last: Option<EpisodeStats>,
}

impl<E: Env> RecordSafetyStatistics<E> {
    pub fn new(inner: E) -> Self { Self { inner, current: EpisodeStats::default(), last: None } }

    pub fn inner(&self) -> &E { &self.inner }
    pub fn inner_mut(&mut self) -> &mut E { &mut self.inner }
    pub fn into_inner(self) -> E { self.inner }

    /// Statistics of the most recently finished episode.
    pub fn last_episode(&self) -> Option<EpisodeStats> { self.last }
}

impl<E: Env> Env for RecordSafetyStatistics<E> {
    type Obs = E::Obs;
    type Act = E::Act;

    fn reset(&mut self, seed: Option<u64>) -> (Self::Obs, Info) {
        self.current = EpisodeStats::default();
        self.inner.reset(seed)
    }

    fn step(&mut self, action: Self::Act) -> Result<Step<Self::Obs>> {
        let mut s = self.inner.step(action)?;
        self.current.episode_return += s.reward;
        self.current.length += 1;
        if s.info.get_bool("unsafe") == Some(true) {
            self.current.unsafe_steps += 1;
        }
        if s.done() {
            let stats = std::mem::take(&mut self.current);
            s.info.insert("episode_return", stats.episode_return);
            s.info.insert("episode_length", stats.length);
            s.info.insert("episode_unsafe_steps", stats.unsafe_steps);
            self.last = Some(stats);
        }
        Ok(s)
    }

    fn close(&mut self) { self.inner.close() }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts up by the action; unsafe above 2, truncated at 4.
    struct Counter {
        state: i32,
    }

    impl Env for Counter {
        type Obs = i32;
        type Act = i32;

        fn reset(&mut self, _seed: Option<u64>) -> (Self::Obs, Info) {
            self.state = 0;
            (0, Info::new())
        }

        fn step(&mut self, action: Self::Act) -> Result<Step<Self::Obs>> {
            self.state += action;
            let mut info = Info::new();
            info.insert("unsafe", self.state > 2);
            Ok(Step::new(self.state, 0.5, false, self.state >= 4, info))
        }
    }

    #[test]
    fn injects_stats_at_episode_end() {
        let mut env = RecordSafetyStatistics::new(Counter { state: 0 });
        env.reset(None);
        for _ in 0..3 {
            let s = env.step(1).unwrap();
            assert!(s.info.get("episode_return").is_none());
        }
        assert!(env.last_episode().is_none());
        let s = env.step(1).unwrap();
        assert!(s.truncated);
        assert_eq!(s.info.get_f64("episode_return"), Some(2.0));
        assert_eq!(s.info.get_f64("episode_length"), Some(4.0));
        assert_eq!(s.info.get_f64("episode_unsafe_steps"), Some(2.0));
        assert_eq!(env.last_episode(), Some(EpisodeStats { episode_return: 2.0, length: 4, unsafe_steps: 2 }));
    }

    #[test]
    fn reset_clears_partial_episode() {
        let mut env = RecordSafetyStatistics::new(Counter { state: 0 });
        env.reset(None);
        env.step(3).unwrap();
        env.reset(None);
        let s = env.step(4).unwrap();
        assert_eq!(s.info.get_f64("episode_length"), Some(1.0));
        assert_eq!(s.info.get_f64("episode_unsafe_steps"), Some(1.0));
    }
}
