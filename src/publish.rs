//! Publication: getting artifacts from the workspace onto the public site.
//!
//! File movement, archiving and animation go through [`ArtifactPublisher`] so
//! the orchestration never depends on a particular external tool. Publishing
//! is best-effort: each failure is logged and reported, never propagated.

mod site;

use std::{
    fs, io,
    path::{Path, PathBuf},
    process::Command,
};

use tracing::{debug, info, warn};

use crate::workspace::Workspace;

pub use site::{
    CommandPageGenerator, PageGenerator, TriggerList, TriggerPage, update_index, update_webpage,
};

/// Frame delay for observing-plot animations, in hundredths of a second.
pub const FRAME_DELAY: u32 = 50;

/// Errors from a single publication step.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to run {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("{program} failed: {stderr}")]
    Failed { program: String, stderr: String },

    #[error("nothing to {0}")]
    Empty(&'static str),
}

/// Copy, archive and animate files.
pub trait ArtifactPublisher {
    fn copy(&mut self, from: &Path, to: &Path) -> Result<(), PublishError>;

    /// Pack `files` flat (no directories) into a zip archive at `dest`.
    fn archive(&mut self, files: &[PathBuf], dest: &Path) -> Result<(), PublishError>;

    /// Compose `frames`, in the given order, into an animation at `dest`.
    fn compose_animation(
        &mut self,
        frames: &[PathBuf],
        dest: &Path,
        delay: u32,
    ) -> Result<(), PublishError>;
}

/// Publisher backed by the filesystem, `zip` and ImageMagick's `convert`.
#[derive(Debug, Default)]
pub struct ShellPublisher;

impl ArtifactPublisher for ShellPublisher {
    fn copy(&mut self, from: &Path, to: &Path) -> Result<(), PublishError> {
        fs::copy(from, to).map_err(|source| PublishError::Io {
            path: from.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    fn archive(&mut self, files: &[PathBuf], dest: &Path) -> Result<(), PublishError> {
        if files.is_empty() {
            return Err(PublishError::Empty("archive"));
        }
        let mut args = vec!["-j".to_string(), dest.display().to_string()];
        args.extend(files.iter().map(|f| f.display().to_string()));
        run_tool("zip", &args)
    }

    fn compose_animation(
        &mut self,
        frames: &[PathBuf],
        dest: &Path,
        delay: u32,
    ) -> Result<(), PublishError> {
        if frames.is_empty() {
            return Err(PublishError::Empty("animate"));
        }
        let mut args = vec!["-delay".to_string(), delay.to_string()];
        args.extend(frames.iter().map(|f| f.display().to_string()));
        args.push(dest.display().to_string());
        run_tool("convert", &args)
    }
}

/// What a publication pass did.
#[derive(Debug, Default)]
pub struct PublishReport {
    pub published: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl PublishReport {
    fn record(&mut self, dest: PathBuf, result: Result<(), PublishError>) {
        match result {
            Ok(()) => {
                debug!("published {}", dest.display());
                self.published.push(dest);
            }
            Err(e) => {
                warn!("could not publish {}: {e}", dest.display());
                self.failed.push((dest, e.to_string()));
            }
        }
    }
}

/// Best-slot map layers and the names they are published under.
const BEST_SLOT_LAYERS: [(&str, &str); 4] = [
    ("maglim", "limitingMagMap"),
    ("prob", "sourceProbMap"),
    ("ligo", "LIGO"),
    ("probXligo", "sourceProbxLIGO"),
];

/// Copy the run's images and animations into the publication area.
///
/// Publishes the animations, every `<trigger_id>*.png` in `maps/` (the
/// probability plot among them), and, when a best slot is known, that slot's
/// map layers under their public names. Missing animations are skipped.
pub fn publish(
    workspace: &Workspace,
    best_slot: Option<i64>,
    publisher: &mut dyn ArtifactPublisher,
) -> PublishReport {
    let id = &workspace.trigger_id;
    let maps = &workspace.maps_dir;
    let images = &workspace.publication.images_dir;
    let mut report = PublishReport::default();

    let animations = [
        format!("{id}_centered_animate.gif"),
        format!("{id}_animate.gif"),
        format!("{id}-observingPlot.gif"),
    ];
    for name in animations {
        let from = maps.join(&name);
        if from.is_file() {
            let dest = images.join(&name);
            report.record(dest.clone(), publisher.copy(&from, &dest));
        }
    }

    for from in trigger_images(maps, id) {
        let Some(name) = from.file_name() else {
            continue;
        };
        let dest = images.join(name);
        report.record(dest.clone(), publisher.copy(&from, &dest));
    }

    if let Some(slot) = best_slot {
        for (layer, public) in BEST_SLOT_LAYERS {
            let from = maps.join(format!("{id}-{slot}-{layer}-eq.png"));
            let dest = images.join(format!("{id}_{public}.png"));
            report.record(dest.clone(), publisher.copy(&from, &dest));
        }
    }

    info!(
        published = report.published.len(),
        failed = report.failed.len(),
        "publication finished"
    );
    report
}

/// Every `<trigger_id>*.png` in a directory, sorted by name.
fn trigger_images(dir: &Path, trigger_id: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut images: Vec<PathBuf> = entries
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            let name = path.file_name()?.to_str()?;
            (name.starts_with(trigger_id) && name.ends_with(".png")).then_some(path.clone())
        })
        .collect();
    images.sort();
    images
}

/// Run an external tool, failing on a non-zero exit.
fn run_tool(program: &str, args: &[String]) -> Result<(), PublishError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| PublishError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PublishError::Failed {
            program: program.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub use super::site::testing::RecordingPages;

    /// A call made to [`RecordingPublisher`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Copy { from: PathBuf, to: PathBuf },
        Archive { files: Vec<PathBuf>, dest: PathBuf },
        Animate { frames: Vec<PathBuf>, dest: PathBuf },
    }

    /// Records every call. Copies for real and writes placeholder
    /// archives and animations so later steps can find them.
    #[derive(Debug, Default)]
    pub struct RecordingPublisher {
        pub calls: Vec<Call>,
    }

    impl RecordingPublisher {
        pub fn archives(&self) -> Vec<&Call> {
            self.calls
                .iter()
                .filter(|c| matches!(c, Call::Archive { .. }))
                .collect()
        }
    }

    impl ArtifactPublisher for RecordingPublisher {
        fn copy(&mut self, from: &Path, to: &Path) -> Result<(), PublishError> {
            self.calls.push(Call::Copy {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
            });
            ShellPublisher.copy(from, to)
        }

        fn archive(&mut self, files: &[PathBuf], dest: &Path) -> Result<(), PublishError> {
            self.calls.push(Call::Archive {
                files: files.to_vec(),
                dest: dest.to_path_buf(),
            });
            let listing: Vec<String> = files.iter().map(|f| f.display().to_string()).collect();
            fs::write(dest, listing.join("\n")).map_err(|source| PublishError::Io {
                path: dest.to_path_buf(),
                source,
            })
        }

        fn compose_animation(
            &mut self,
            frames: &[PathBuf],
            dest: &Path,
            _delay: u32,
        ) -> Result<(), PublishError> {
            self.calls.push(Call::Animate {
                frames: frames.to_vec(),
                dest: dest.to_path_buf(),
            });
            fs::write(dest, b"GIF89a").map_err(|source| PublishError::Io {
                path: dest.to_path_buf(),
                source,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::model::{Regime, TriggerEvent};

    use super::testing::{Call, RecordingPublisher};

    fn sample_workspace(dir: &Path) -> Workspace {
        let trigger = TriggerEvent {
            trigger_id: "S190814bv".into(),
            trigger_dir: "GW190814".into(),
            mjd: 58_709.88,
            skymap: dir.join("GW190814.fits"),
            regime: Regime::NoRemnant,
        };
        let ws = Workspace::resolve(&trigger, &dir.join("master"), &dir.join("web"));
        fs::create_dir_all(&ws.maps_dir).unwrap();
        fs::create_dir_all(&ws.publication.images_dir).unwrap();
        ws
    }

    #[test]
    fn publishes_animations_and_trigger_images() {
        let dir = TempDir::new().unwrap();
        let ws = sample_workspace(dir.path());
        for name in [
            "S190814bv_animate.gif",
            "S190814bv-probabilityPlot.png",
            "S190814bv-observingPlot-1.png",
            "other-trigger.png",
        ] {
            fs::write(ws.maps_dir.join(name), b"img").unwrap();
        }

        let mut publisher = RecordingPublisher::default();
        let report = publish(&ws, None, &mut publisher);

        let images = &ws.publication.images_dir;
        assert!(images.join("S190814bv_animate.gif").is_file());
        assert!(images.join("S190814bv-probabilityPlot.png").is_file());
        assert!(images.join("S190814bv-observingPlot-1.png").is_file());
        assert!(!images.join("other-trigger.png").exists());
        assert_eq!(report.published.len(), 3);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn renames_best_slot_layers() {
        let dir = TempDir::new().unwrap();
        let ws = sample_workspace(dir.path());
        for layer in ["maglim", "prob", "ligo", "probXligo"] {
            fs::write(ws.maps_dir.join(format!("S190814bv-3-{layer}-eq.png")), b"img").unwrap();
        }

        let mut publisher = RecordingPublisher::default();
        publish(&ws, Some(3), &mut publisher);

        let images = &ws.publication.images_dir;
        assert!(images.join("S190814bv_limitingMagMap.png").is_file());
        assert!(images.join("S190814bv_sourceProbMap.png").is_file());
        assert!(images.join("S190814bv_LIGO.png").is_file());
        assert!(images.join("S190814bv_sourceProbxLIGO.png").is_file());
    }

    #[test]
    fn missing_layer_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let ws = sample_workspace(dir.path());

        let mut publisher = RecordingPublisher::default();
        let report = publish(&ws, Some(7), &mut publisher);

        assert_eq!(report.failed.len(), BEST_SLOT_LAYERS.len());
        assert!(publisher.calls.iter().all(|c| matches!(c, Call::Copy { .. })));
    }

    #[test]
    fn shell_publisher_refuses_empty_archive() {
        let dir = TempDir::new().unwrap();
        let err = ShellPublisher
            .archive(&[], &dir.path().join("empty.zip"))
            .unwrap_err();
        assert!(matches!(err, PublishError::Empty("archive")));
    }
}
