use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};
use super::{Result, SegmentError, TrimRange};

fn seconds(value: f64) -> String {
    format!("{:.3}", value)
}

/// Drives the external media tool (ffmpeg-compatible CLI) for trim, concat
/// and preview renditions. All cutting uses stream copy; re-encoding only
/// happens for previews.
#[derive(Debug, Clone)]
pub struct SegmentProcessor {
    tool: PathBuf,
}

impl SegmentProcessor {
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self { tool: tool.into() }
    }

    /// Cuts each range into `part_<index>.mp4` inside `workdir`, then
    /// concatenates the parts in input order into `output`. Any failed step
    /// aborts the whole job; `output` is only written on full success.
    /// With no ranges the source passes through unchanged.
    pub async fn cut_and_concat(
        &self,
        source: &Path,
        ranges: &[TrimRange],
        workdir: &Path,
        output: &Path,
    ) -> Result<()> {
        if ranges.is_empty() {
            tokio::fs::copy(source, output).await?;
            return Ok(());
        }

        for range in ranges {
            if !(range.start >= 0.0 && range.end > range.start) {
                return Err(SegmentError::InvalidRange {
                    start: range.start,
                    end: range.end,
                });
            }
        }

        let mut parts = Vec::with_capacity(ranges.len());
        for (index, range) in ranges.iter().enumerate() {
            let part = workdir.join(format!("part_{}.mp4", index));
            debug!(part = %part.display(), start = range.start, end = range.end, "cutting segment");
            self.run(&Self::trim_args(source, range, &part)).await?;
            parts.push(part);
        }

        let manifest_path = workdir.join("concat.txt");
        tokio::fs::write(&manifest_path, Self::concat_manifest(&parts)).await?;
        self.run(&Self::concat_args(&manifest_path, output)).await?;

        info!(output = %output.display(), segments = ranges.len(), "segments concatenated");
        Ok(())
    }

    /// Renders the low-bitrate 480p preview used by the review UI.
    pub async fn preview(&self, source: &Path, output: &Path) -> Result<()> {
        self.run(&Self::preview_args(source, output)).await
    }

    fn trim_args(source: &Path, range: &TrimRange, part: &Path) -> Vec<String> {
        vec![
            "-ss".into(),
            seconds(range.start),
            "-i".into(),
            source.display().to_string(),
            "-t".into(),
            seconds(range.duration()),
            "-c".into(),
            "copy".into(),
            "-avoid_negative_ts".into(),
            "1".into(),
            "-y".into(),
            part.display().to_string(),
        ]
    }

    /// Part names are relative to the manifest's directory.
    fn concat_manifest(parts: &[PathBuf]) -> String {
        parts
            .iter()
            .filter_map(|part| part.file_name())
            .map(|name| format!("file '{}'\n", name.to_string_lossy()))
            .collect()
    }

    fn concat_args(manifest: &Path, output: &Path) -> Vec<String> {
        vec![
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            manifest.display().to_string(),
            "-c".into(),
            "copy".into(),
            "-y".into(),
            output.display().to_string(),
        ]
    }

    fn preview_args(source: &Path, output: &Path) -> Vec<String> {
        vec![
            "-i".into(),
            source.display().to_string(),
            "-vf".into(),
            "scale=-2:480".into(),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "ultrafast".into(),
            "-b:v".into(),
            "800k".into(),
            "-c:a".into(),
            "aac".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-movflags".into(),
            "+faststart".into(),
            "-y".into(),
            output.display().to_string(),
        ]
    }

    async fn run(&self, args: &[String]) -> Result<()> {
        let output = Command::new(&self.tool).args(args).output().await?;

        if !output.status.success() {
            return Err(SegmentError::Tool {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_args_use_stream_copy() {
        let range = TrimRange { start: 1.5, end: 4.0 };
        let args = SegmentProcessor::trim_args(
            Path::new("/in/src.mp4"),
            &range,
            Path::new("/work/part_0.mp4"),
        );

        assert_eq!(args[0], "-ss");
        assert_eq!(args[1], "1.500");
        assert_eq!(args[5], "2.500");
        assert!(args.windows(2).any(|w| w == ["-c", "copy"]));
        assert!(args.windows(2).any(|w| w == ["-avoid_negative_ts", "1"]));
    }

    #[test]
    fn test_manifest_preserves_input_order() {
        let parts = vec![
            PathBuf::from("/work/part_0.mp4"),
            PathBuf::from("/work/part_1.mp4"),
            PathBuf::from("/work/part_2.mp4"),
        ];

        assert_eq!(
            SegmentProcessor::concat_manifest(&parts),
            "file 'part_0.mp4'\nfile 'part_1.mp4'\nfile 'part_2.mp4'\n"
        );
    }

    #[tokio::test]
    async fn test_invalid_range_is_rejected_before_any_cut() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.mp4");
        tokio::fs::write(&source, b"data").await.unwrap();
        let output = dir.path().join("out.mp4");

        let processor = SegmentProcessor::new("false");
        let ranges = [TrimRange { start: 5.0, end: 2.0 }];
        let result = processor
            .cut_and_concat(&source, &ranges, dir.path(), &output)
            .await;

        assert!(matches!(result, Err(SegmentError::InvalidRange { .. })));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_failed_cut_aborts_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.mp4");
        tokio::fs::write(&source, b"data").await.unwrap();
        let output = dir.path().join("out.mp4");

        // `false` exits non-zero and writes nothing
        let processor = SegmentProcessor::new("false");
        let ranges = [TrimRange { start: 0.0, end: 2.0 }];
        let result = processor
            .cut_and_concat(&source, &ranges, dir.path(), &output)
            .await;

        assert!(matches!(result, Err(SegmentError::Tool { .. })));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_no_ranges_passes_source_through() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.mp4");
        tokio::fs::write(&source, b"payload").await.unwrap();
        let output = dir.path().join("out.mp4");

        let processor = SegmentProcessor::new("false");
        processor
            .cut_and_concat(&source, &[], dir.path(), &output)
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"payload");
    }
}
