//! Pure timeline planning: panning, gap interleave, tempo chain, bed
//! offsets and the ffmpeg filter graphs built from them.

use crate::config::LoudnessTarget;
use crate::error::{AppError, AppResult};

/// Valid ratio range of a single `atempo` stage.
pub const TEMPO_MIN: f64 = 0.5;
pub const TEMPO_MAX: f64 = 2.0;

/// Split a tempo factor into `atempo` stages that are each within
/// [`TEMPO_MIN`, `TEMPO_MAX`] and whose product equals `speed`.
/// A factor of exactly 1 needs no stage.
pub fn tempo_chain(speed: f64) -> AppResult<Vec<f64>> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(AppError::Config(format!("invalid tempo factor {}", speed)));
    }
    if speed == 1.0 {
        return Ok(Vec::new());
    }

    let mut stages = Vec::new();
    let mut remaining = speed;
    while remaining > TEMPO_MAX {
        stages.push(TEMPO_MAX);
        remaining /= TEMPO_MAX;
    }
    while remaining < TEMPO_MIN {
        stages.push(TEMPO_MIN);
        remaining /= TEMPO_MIN;
    }
    stages.push(remaining);
    Ok(stages)
}

/// Stereo position of a clip, alternating by sequence index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pan {
    Left,
    Right,
}

impl Pan {
    pub fn for_index(index: usize) -> Self {
        if index % 2 == 0 {
            Self::Left
        } else {
            Self::Right
        }
    }

    /// The quiet channel still gets `bleed` of the signal.
    pub fn filter(self, bleed: f64) -> String {
        match self {
            Self::Left => format!("pan=stereo|c0=c0|c1={}*c0", bleed),
            Self::Right => format!("pan=stereo|c0={}*c0|c1=c0", bleed),
        }
    }
}

/// One element of the concatenated narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Clip(usize),
    Gap(usize),
}

/// Clips in order with a gap between each consecutive pair and none at the
/// edges: N clips yield N-1 gaps.
pub fn segment_order(clip_count: usize, with_gaps: bool) -> Vec<Segment> {
    let mut segments = Vec::with_capacity(clip_count * 2);
    for i in 0..clip_count {
        if with_gaps && i > 0 {
            segments.push(Segment::Gap(i - 1));
        }
        segments.push(Segment::Clip(i));
    }
    segments
}

/// Parameters of the narration-only pass.
#[derive(Debug, Clone)]
pub struct NarrationSpec {
    pub clip_count: usize,
    pub gap_seconds: f64,
    pub pan_bleed: f64,
    pub sample_rate: u32,
    pub speed: f64,
}

impl NarrationSpec {
    fn has_gaps(&self) -> bool {
        self.gap_seconds > 0.0 && self.clip_count > 1
    }

    /// Filter graph over inputs `0..clip_count`, producing `[out]`.
    pub fn filter_graph(&self) -> AppResult<String> {
        if self.clip_count == 0 {
            return Err(AppError::Precondition("no clips to assemble".to_string()));
        }

        let mut parts: Vec<String> = (0..self.clip_count)
            .map(|i| {
                format!(
                    "[{}:a]{},aresample={}[v{}]",
                    i,
                    Pan::for_index(i).filter(self.pan_bleed),
                    self.sample_rate,
                    i
                )
            })
            .collect();

        if self.has_gaps() {
            let gaps = self.clip_count - 1;
            let silence = format!(
                "anullsrc=r={}:cl=stereo,atrim=0:{}",
                self.sample_rate, self.gap_seconds
            );
            if gaps == 1 {
                parts.push(format!("{}[s0]", silence));
            } else {
                let labels: String = (0..gaps).map(|i| format!("[s{}]", i)).collect();
                parts.push(format!("{},asplit={}{}", silence, gaps, labels));
            }
        }

        let segments = segment_order(self.clip_count, self.has_gaps());
        let labels: String = segments
            .iter()
            .map(|s| match s {
                Segment::Clip(i) => format!("[v{}]", i),
                Segment::Gap(i) => format!("[s{}]", i),
            })
            .collect();

        let tempo = tempo_chain(self.speed)?;
        if tempo.is_empty() {
            parts.push(format!("{}concat=n={}:v=0:a=1[out]", labels, segments.len()));
        } else {
            let chain: Vec<String> = tempo.iter().map(|t| format!("atempo={}", t)).collect();
            parts.push(format!(
                "{}concat=n={}:v=0:a=1[merged]",
                labels,
                segments.len()
            ));
            parts.push(format!("[merged]{}[out]", chain.join(",")));
        }

        Ok(parts.join(";"))
    }
}

/// Where the narration and outro start in the final mix, given the measured
/// narration length. The intro bed starts at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BedPlacement {
    pub narration_delay_ms: u64,
    pub outro_delay_ms: u64,
}

impl BedPlacement {
    pub fn compute(narration_seconds: f64, intro_solo_seconds: f64, outro_overlap_seconds: f64) -> Self {
        let outro_start = (intro_solo_seconds + narration_seconds - outro_overlap_seconds).max(0.0);
        Self {
            narration_delay_ms: (intro_solo_seconds.max(0.0) * 1000.0).round() as u64,
            outro_delay_ms: (outro_start * 1000.0).round() as u64,
        }
    }

    /// Filter graph over inputs 0 = intro, 1 = outro, 2 = narration,
    /// producing `[out]`.
    pub fn filter_graph(&self, loudness: &LoudnessTarget) -> String {
        let n = self.narration_delay_ms;
        let o = self.outro_delay_ms;
        [
            format!("[2:a]adelay={}|{}[voices_delayed]", n, n),
            format!("[1:a]adelay={}|{}[outro_delayed]", o, o),
            "[0:a][voices_delayed][outro_delayed]amix=inputs=3:duration=longest:normalize=0[mixed]"
                .to_string(),
            format!(
                "[mixed]loudnorm=I={}:TP={}:LRA={}[out]",
                loudness.integrated, loudness.true_peak, loudness.range
            ),
        ]
        .join(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(stages: &[f64]) -> f64 {
        stages.iter().product()
    }

    #[test]
    fn test_tempo_identity_has_no_stage() {
        assert!(tempo_chain(1.0).unwrap().is_empty());
    }

    #[test]
    fn test_tempo_in_range_is_single_stage() {
        assert_eq!(tempo_chain(1.25).unwrap(), vec![1.25]);
        assert_eq!(tempo_chain(0.5).unwrap(), vec![0.5]);
        assert_eq!(tempo_chain(2.0).unwrap(), vec![2.0]);
    }

    #[test]
    fn test_tempo_out_of_range_decomposes() {
        for speed in [3.0, 4.5, 10.0, 0.3, 0.1, 0.01] {
            let stages = tempo_chain(speed).unwrap();
            assert!(stages.len() > 1, "{} should need several stages", speed);
            assert!(
                stages.iter().all(|s| (TEMPO_MIN..=TEMPO_MAX).contains(s)),
                "{:?} out of range",
                stages
            );
            assert!((product(&stages) - speed).abs() < 1e-9, "{:?} != {}", stages, speed);
        }
        assert_eq!(tempo_chain(3.0).unwrap(), vec![2.0, 1.5]);
    }

    #[test]
    fn test_tempo_rejects_nonsense() {
        assert!(tempo_chain(0.0).is_err());
        assert!(tempo_chain(-1.0).is_err());
        assert!(tempo_chain(f64::NAN).is_err());
        assert!(tempo_chain(f64::INFINITY).is_err());
    }

    #[test]
    fn test_segments_have_n_minus_one_gaps() {
        for n in 1..8 {
            let segments = segment_order(n, true);
            let clips: Vec<usize> = segments
                .iter()
                .filter_map(|s| match s {
                    Segment::Clip(i) => Some(*i),
                    _ => None,
                })
                .collect();
            let gaps = segments.iter().filter(|s| matches!(s, Segment::Gap(_))).count();
            assert_eq!(clips, (0..n).collect::<Vec<_>>());
            assert_eq!(gaps, n - 1);
            assert!(matches!(segments.first(), Some(Segment::Clip(0))));
            assert!(matches!(segments.last(), Some(Segment::Clip(i)) if *i == n - 1));
        }
    }

    #[test]
    fn test_pan_alternates_by_parity() {
        assert_eq!(Pan::for_index(0), Pan::Left);
        assert_eq!(Pan::for_index(1), Pan::Right);
        assert_eq!(Pan::for_index(2), Pan::Left);
        assert_eq!(Pan::Left.filter(0.85), "pan=stereo|c0=c0|c1=0.85*c0");
        assert_eq!(Pan::Right.filter(0.85), "pan=stereo|c0=0.85*c0|c1=c0");
    }

    fn spec(clip_count: usize, gap_seconds: f64, speed: f64) -> NarrationSpec {
        NarrationSpec {
            clip_count,
            gap_seconds,
            pan_bleed: 0.85,
            sample_rate: 44100,
            speed,
        }
    }

    #[test]
    fn test_narration_graph_four_clips() {
        let graph = spec(4, 0.5, 1.25).filter_graph().unwrap();
        assert!(graph.starts_with("[0:a]pan=stereo|c0=c0|c1=0.85*c0,aresample=44100[v0];"));
        assert!(graph.contains("[1:a]pan=stereo|c0=0.85*c0|c1=c0,aresample=44100[v1]"));
        assert!(graph.contains("anullsrc=r=44100:cl=stereo,atrim=0:0.5,asplit=3[s0][s1][s2]"));
        assert!(graph.contains("[v0][s0][v1][s1][v2][s2][v3]concat=n=7:v=0:a=1[merged]"));
        assert!(graph.ends_with("[merged]atempo=1.25[out]"));
    }

    #[test]
    fn test_narration_graph_two_clips_single_gap() {
        let graph = spec(2, 0.5, 1.0).filter_graph().unwrap();
        assert!(graph.contains("atrim=0:0.5[s0]"));
        assert!(!graph.contains("asplit"));
        assert!(graph.ends_with("[v0][s0][v1]concat=n=3:v=0:a=1[out]"));
    }

    #[test]
    fn test_narration_graph_without_gap() {
        let graph = spec(3, 0.0, 1.0).filter_graph().unwrap();
        assert!(!graph.contains("anullsrc"));
        assert!(graph.ends_with("[v0][v1][v2]concat=n=3:v=0:a=1[out]"));

        let single = spec(1, 0.5, 1.0).filter_graph().unwrap();
        assert!(!single.contains("anullsrc"));
        assert!(single.ends_with("[v0]concat=n=1:v=0:a=1[out]"));
    }

    #[test]
    fn test_narration_graph_chains_tempo_stages() {
        let graph = spec(2, 0.5, 3.0).filter_graph().unwrap();
        assert!(graph.ends_with("[merged]atempo=2,atempo=1.5[out]"));
    }

    #[test]
    fn test_narration_graph_requires_clips() {
        assert!(matches!(
            spec(0, 0.5, 1.0).filter_graph(),
            Err(AppError::Precondition(_))
        ));
    }

    #[test]
    fn test_bed_placement_uses_measured_duration() {
        let placement = BedPlacement::compute(120.0, 10.0, 7.0);
        assert_eq!(placement.narration_delay_ms, 10_000);
        assert_eq!(placement.outro_delay_ms, 123_000);

        let fractional = BedPlacement::compute(61.2504, 10.0, 7.0);
        assert_eq!(fractional.outro_delay_ms, 64_250);
    }

    #[test]
    fn test_bed_placement_clamps_short_narration() {
        let placement = BedPlacement::compute(1.0, 2.0, 7.0);
        assert_eq!(placement.outro_delay_ms, 0);
    }

    #[test]
    fn test_mix_graph() {
        let graph = BedPlacement::compute(100.0, 10.0, 7.0).filter_graph(&LoudnessTarget::default());
        assert_eq!(
            graph,
            "[2:a]adelay=10000|10000[voices_delayed];\
[1:a]adelay=103000|103000[outro_delayed];\
[0:a][voices_delayed][outro_delayed]amix=inputs=3:duration=longest:normalize=0[mixed];\
[mixed]loudnorm=I=-16:TP=-1.5:LRA=11[out]"
        );
    }
}
