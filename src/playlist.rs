use std::path::{Path, PathBuf};

use tokio::{
    fs::File,
    io::{AsyncWriteExt, BufWriter},
};
use tracing::{error, warn};

use crate::descriptor::Metadata;

/// `#EXTM3U` header, album, playlist title and one artist line per creator.
pub fn header_lines(metadata: &Metadata) -> String {
    let mut out = String::from("#EXTM3U\n#EXTENC:UTF-8\n");
    out.push_str(&format!("#EXTALB:{}\n", metadata.title));
    match metadata.first_creator() {
        Some(creator) => out.push_str(&format!("#PLAYLIST:{} by {}\n", metadata.title, creator.name)),
        None => out.push_str(&format!("#PLAYLIST:{}\n", metadata.title)),
    }
    for creator in &metadata.creators {
        out.push_str(&format!("#EXTART:{} ({})\n", creator.name, creator.role));
    }
    out
}

pub fn image_block(label: &str, filename: &str) -> String {
    format!("#EXTIMG:{label}\n{filename}\n")
}

/// One track, preceded by the blank line separating it from the previous entry
pub fn track_block(seconds: u64, title: &str, part_name: &str, filename: &str) -> String {
    format!("\n#EXTINF:{seconds},{title} - {part_name}\n{filename}\n")
}

/// Extended M3U file written as the run progresses.
///
/// Creating the file may fail without failing the run; the writer then has no
/// handle and every write is skipped. The same happens after the first failed
/// write.
pub struct PlaylistWriter {
    path: PathBuf,
    file: Option<BufWriter<File>>,
}

impl PlaylistWriter {
    pub async fn create(path: PathBuf) -> Self {
        let file = match File::create(&path).await {
            Ok(f) => Some(BufWriter::new(f)),
            Err(e) => {
                warn!(
                    "Failed to create playlist {}, continuing without it: {}",
                    path.display(),
                    e
                );
                None
            }
        };
        Self { path, file }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub async fn write(&mut self, text: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if let Err(e) = file.write_all(text.as_bytes()).await {
            error!(
                "Failed to write playlist {}, no further entries will be written: {}",
                self.path.display(),
                e
            );
            self.file = None;
        }
    }

    /// Flushes the playlist. Returns its path if it was written completely.
    pub async fn finish(mut self) -> Option<PathBuf> {
        let mut file = self.file.take()?;
        match file.flush().await {
            Ok(()) => Some(self.path),
            Err(e) => {
                error!("Failed to flush playlist {}: {}", self.path.display(), e);
                None
            }
        }
    }
}
