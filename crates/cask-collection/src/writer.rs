use std::collections::VecDeque;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::BytesMut;
use cask_manifest::{escape_name, normalize_stream_name};
use cask_store::BlockStore;
use cask_types::Locator;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::CollectionConfig;
use crate::error::{CollectionError, CollectionResult};
use crate::reader::CollectionReader;
use crate::source::Source;

/// A file written to a stream: `len` bytes at `start` in stream space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
    pub start: u64,
    pub len: u64,
    pub name: String,
}

/// A stream as the writer produced it, before normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinishedStream {
    pub name: String,
    pub locators: Vec<Locator>,
    pub files: Vec<FileRecord>,
}

/// Largest single read from a file source.
const READ_CHUNK: usize = 64 * 1024;

struct QueuedFile {
    path: PathBuf,
    file: File,
}

struct TreeJob {
    path: PathBuf,
    stream_name: String,
    max_depth: i32,
}

/// Entries of the tree currently being expanded.
struct DirentQueue {
    tree: TreeJob,
    entries: VecDeque<String>,
}

/// Builds a collection from byte sources and directory trees.
///
/// Bytes are buffered until a full block is available, then stored through
/// the [`BlockStore`]. The writer tracks, per stream, the blocks written and
/// the `(start, length, name)` of every finished file. Manifest text is
/// always produced through the reader's normalization, never directly.
///
/// Tree and file jobs go through a three-level work queue: the open file is
/// drained completely before the next directory entry is looked at, and one
/// directory's entries are drained before the next queued tree is listed.
/// At any moment the writer holds at most one open file and one block of
/// buffered data, however large or deep the tree.
pub struct CollectionWriter {
    store: Arc<dyn BlockStore>,
    config: CollectionConfig,

    data_buffer: BytesMut,
    current_stream_length: u64,
    current_stream_locators: Vec<Locator>,
    current_stream_files: Vec<FileRecord>,
    current_stream_name: Option<String>,
    current_file_name: Option<String>,
    current_file_pos: u64,
    finished_streams: Vec<FinishedStream>,

    queued_file: Option<QueuedFile>,
    queued_dirents: Option<DirentQueue>,
    queued_trees: VecDeque<TreeJob>,
}

impl CollectionWriter {
    /// Create a writer. The first stream is named `.`.
    pub fn new(store: Arc<dyn BlockStore>, config: CollectionConfig) -> CollectionResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            data_buffer: BytesMut::new(),
            current_stream_length: 0,
            current_stream_locators: Vec::new(),
            current_stream_files: Vec::new(),
            current_stream_name: Some(".".to_string()),
            current_file_name: None,
            current_file_pos: 0,
            finished_streams: Vec::new(),
            queued_file: None,
            queued_dirents: None,
            queued_trees: VecDeque::new(),
        })
    }

    // ---------------------------------------------------------------
    // Byte-level writing
    // ---------------------------------------------------------------

    /// Append bytes to the current file, storing every full block.
    pub fn write(&mut self, data: &[u8]) -> CollectionResult<()> {
        let block_size = self.config.block_size;
        let mut rest = data;
        while !rest.is_empty() {
            let take = (block_size - self.data_buffer.len()).min(rest.len());
            self.data_buffer.extend_from_slice(&rest[..take]);
            self.current_stream_length += take as u64;
            rest = &rest[take..];
            if self.data_buffer.len() >= block_size {
                self.flush_data()?;
            }
        }
        Ok(())
    }

    /// Store up to one block of buffered bytes.
    pub fn flush_data(&mut self) -> CollectionResult<()> {
        if self.data_buffer.is_empty() {
            return Ok(());
        }
        let n = self.data_buffer.len().min(self.config.block_size);
        let block = self.data_buffer.split_to(n).freeze();
        let locator = self.store.put(&block)?;
        debug!(%locator, stream = ?self.current_stream_name, "stored block");
        self.current_stream_locators.push(locator);
        Ok(())
    }

    /// Bytes buffered but not yet stored. Always less than one block between
    /// calls.
    pub fn buffered_len(&self) -> usize {
        self.data_buffer.len()
    }

    /// Copy `source` to exhaustion through a scratch chunk of at most
    /// [`READ_CHUNK`] bytes.
    fn write_from(&mut self, source: &mut dyn Read) -> CollectionResult<()> {
        let mut chunk = vec![0u8; READ_CHUNK.min(self.config.block_size)];
        loop {
            let n = match source.read(&mut chunk) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.write(&chunk[..n])?;
        }
    }

    // ---------------------------------------------------------------
    // Files and streams
    // ---------------------------------------------------------------

    /// Finish the current file and name the next one.
    pub fn start_new_file(&mut self, name: &str) -> CollectionResult<()> {
        self.finish_current_file()?;
        check_name("file", name)?;
        self.current_file_name = Some(name.to_string());
        Ok(())
    }

    pub fn current_file_name(&self) -> Option<&str> {
        self.current_file_name.as_deref()
    }

    /// Record the current file as everything written since it started.
    ///
    /// Without a current file name this is a no-op, unless bytes were
    /// written, which is an error.
    pub fn finish_current_file(&mut self) -> CollectionResult<()> {
        let len = self.current_stream_length - self.current_file_pos;
        match self.current_file_name.take() {
            None if len == 0 => Ok(()),
            None => Err(CollectionError::UnnamedFile {
                len,
                offset: self.current_file_pos,
                stream: self.current_stream_name.clone(),
            }),
            Some(name) => {
                self.current_stream_files.push(FileRecord {
                    start: self.current_file_pos,
                    len,
                    name,
                });
                self.current_file_pos = self.current_stream_length;
                Ok(())
            }
        }
    }

    /// Finish the current stream and name the next one. An empty name means
    /// `.`.
    pub fn start_new_stream(&mut self, name: &str) -> CollectionResult<()> {
        self.finish_current_stream()?;
        check_name("stream", name)?;
        self.current_stream_name = Some(if name.is_empty() { "." } else { name }.to_string());
        Ok(())
    }

    pub fn current_stream_name(&self) -> Option<&str> {
        self.current_stream_name.as_deref()
    }

    /// Store the last partial block, finish the current file, and move the
    /// stream to the finished list.
    ///
    /// Streams without files are dropped. A stream with files but no blocks
    /// (only empty files) gets the empty-block locator.
    pub fn finish_current_stream(&mut self) -> CollectionResult<()> {
        self.finish_current_file()?;
        self.flush_data()?;

        if !self.current_stream_files.is_empty() {
            let Some(name) = self.current_stream_name.take() else {
                return Err(CollectionError::UnnamedStream {
                    len: self.current_stream_length,
                    files: self.current_stream_files.len(),
                });
            };
            let mut locators = std::mem::take(&mut self.current_stream_locators);
            if locators.is_empty() {
                locators.push(self.config.empty_block_locator.clone());
            }
            let files = std::mem::take(&mut self.current_stream_files);
            debug!(
                stream = %name,
                blocks = locators.len(),
                files = files.len(),
                bytes = self.current_stream_length,
                "finished stream"
            );
            self.finished_streams.push(FinishedStream {
                name,
                locators,
                files,
            });
        }

        self.current_stream_files.clear();
        self.current_stream_length = 0;
        self.current_stream_locators.clear();
        self.current_stream_name = None;
        self.current_file_pos = 0;
        self.current_file_name = None;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Queued work
    // ---------------------------------------------------------------

    /// Write everything `source` yields as file `name` in the current stream.
    ///
    /// Pass `&mut reader` to keep the handle open afterwards; a reader passed
    /// by value is dropped once the file is finished.
    pub fn write_file<R: Read>(&mut self, mut source: R, name: &str) -> CollectionResult<()> {
        if let Some(queued) = &self.queued_file {
            return Err(CollectionError::FileAlreadyQueued(
                queued.path.display().to_string(),
            ));
        }
        self.start_new_file(name)?;
        self.write_from(&mut source)?;
        self.finish_current_file()?;
        drop(source);
        self.do_queued_work()
    }

    /// Open `path` and write it as a file in the current stream, named `name`
    /// or, by default, the path's last component. The writer closes the file
    /// when done.
    pub fn write_file_path(
        &mut self,
        path: impl AsRef<Path>,
        name: Option<&str>,
    ) -> CollectionResult<()> {
        self.queue_file(path.as_ref(), name)?;
        self.do_queued_work()
    }

    /// Write a directory tree starting at stream `stream_name`.
    ///
    /// `max_depth` is the number of directory levels that become streams of
    /// their own. At `0` a directory's whole subtree is flattened into one
    /// stream with path-qualified file names. Negative values never reach
    /// `0`, so every subdirectory becomes its own stream.
    pub fn write_directory_tree(
        &mut self,
        path: impl AsRef<Path>,
        stream_name: &str,
        max_depth: i32,
    ) -> CollectionResult<()> {
        self.queue_tree(path.as_ref().to_path_buf(), tree_stream_name(stream_name), max_depth);
        self.do_queued_work()
    }

    fn do_queued_work(&mut self) -> CollectionResult<()> {
        loop {
            if self.queued_file.is_some() {
                self.work_file()?;
            } else if self.queued_dirents.is_some() {
                self.work_dirents()?;
            } else if !self.queued_trees.is_empty() {
                self.work_trees()?;
            } else {
                return Ok(());
            }
        }
    }

    fn work_file(&mut self) -> CollectionResult<()> {
        let Some(mut queued) = self.queued_file.take() else {
            return Ok(());
        };
        self.write_from(&mut queued.file)?;
        self.finish_current_file()?;
        debug!(path = %queued.path.display(), "wrote file");
        Ok(())
    }

    /// Walk the current tree's entries until one is a file to write.
    /// Subdirectories become tree jobs of their own.
    fn work_dirents(&mut self) -> CollectionResult<()> {
        let Some(mut dirents) = self.queued_dirents.take() else {
            return Ok(());
        };
        while let Some(entry) = dirents.entries.pop_front() {
            let target = dirents.tree.path.join(&entry);
            if target.is_dir() {
                let stream_name = tree_stream_name(&format!("{}/{entry}", dirents.tree.stream_name));
                self.queue_tree(target, stream_name, dirents.tree.max_depth - 1);
            } else {
                self.queue_file(&target, Some(&entry))?;
                break;
            }
        }
        if !dirents.entries.is_empty() {
            self.queued_dirents = Some(dirents);
        }
        Ok(())
    }

    /// List the next queued tree and start its stream.
    fn work_trees(&mut self) -> CollectionResult<()> {
        let Some(tree) = self.queued_trees.pop_front() else {
            return Ok(());
        };
        let entries = if tree.max_depth == 0 {
            list_recursive(&tree.path)?
        } else {
            list_flat(&tree.path)?
        };
        self.start_new_stream(&tree.stream_name)?;
        debug!(
            path = %tree.path.display(),
            stream = %tree.stream_name,
            entries = entries.len(),
            "expanding tree"
        );
        if !entries.is_empty() {
            self.queued_dirents = Some(DirentQueue {
                tree,
                entries: entries.into(),
            });
        }
        Ok(())
    }

    fn queue_file(&mut self, path: &Path, name: Option<&str>) -> CollectionResult<()> {
        if let Some(queued) = &self.queued_file {
            return Err(CollectionError::FileAlreadyQueued(
                queued.path.display().to_string(),
            ));
        }
        let name = match name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    CollectionError::InvalidArgument(format!(
                        "{} has no file name",
                        path.display()
                    ))
                })?,
        };
        let file = File::open(path)?;
        self.start_new_file(&name)?;
        self.queued_file = Some(QueuedFile {
            path: path.to_path_buf(),
            file,
        });
        Ok(())
    }

    fn queue_tree(&mut self, path: PathBuf, stream_name: String, max_depth: i32) {
        self.queued_trees.push_back(TreeJob {
            path,
            stream_name,
            max_depth,
        });
    }

    // ---------------------------------------------------------------
    // Output
    // ---------------------------------------------------------------

    /// Finish the collection: store the manifest as a block and return its
    /// locator, which identifies the collection.
    pub fn finish(&mut self) -> CollectionResult<Locator> {
        let text = self.manifest_text()?;
        let locator = self.store.put(text.as_bytes())?;
        info!(
            %locator,
            streams = self.finished_streams.len(),
            "collection finished"
        );
        Ok(locator)
    }

    /// Finish the current stream and return the normalized manifest.
    pub fn manifest_text(&mut self) -> CollectionResult<String> {
        self.finish_current_stream()?;
        let mut reader = CollectionReader::from_source(
            Source::ManifestText(self.raw_manifest_text()),
            Arc::clone(&self.store),
            self.config.clone(),
        );
        Ok(reader.manifest_text()?.to_string())
    }

    fn raw_manifest_text(&self) -> String {
        let mut out = String::new();
        for stream in &self.finished_streams {
            out.push_str(&escape_name(&normalize_stream_name(&stream.name)));
            for locator in &stream.locators {
                out.push(' ');
                out.push_str(&locator.to_string());
            }
            for file in &stream.files {
                out.push_str(&format!(
                    " {}:{}:{}",
                    file.start,
                    file.len,
                    escape_name(&file.name)
                ));
            }
            out.push('\n');
        }
        out
    }

    /// Every block referenced by the finished streams, in stream order.
    pub fn data_locators(&self) -> Vec<Locator> {
        self.finished_streams
            .iter()
            .flat_map(|s| s.locators.iter().cloned())
            .collect()
    }

    /// Finished streams as written, before normalization.
    pub fn finished_streams(&self) -> &[FinishedStream] {
        &self.finished_streams
    }
}

impl std::fmt::Debug for CollectionWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionWriter")
            .field("current_stream", &self.current_stream_name)
            .field("current_file", &self.current_file_name)
            .field("buffered", &self.data_buffer.len())
            .field("finished_streams", &self.finished_streams.len())
            .finish()
    }
}

fn check_name(kind: &'static str, name: &str) -> CollectionResult<()> {
    if name.contains(['\t', '\n']) {
        return Err(CollectionError::IllegalName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Rooted stream name for a tree, without a trailing `/`.
fn tree_stream_name(name: &str) -> String {
    normalize_stream_name(name.trim_end_matches('/'))
}

fn utf8_name(name: std::ffi::OsString) -> CollectionResult<String> {
    name.into_string().map_err(|name| {
        CollectionError::InvalidArgument(format!("non UTF-8 file name {name:?}"))
    })
}

/// Sorted names of a directory's immediate entries.
fn list_flat(dir: &Path) -> CollectionResult<Vec<String>> {
    let mut names = std::fs::read_dir(dir)?
        .map(|entry| utf8_name(entry?.file_name()))
        .collect::<CollectionResult<Vec<_>>>()?;
    names.sort();
    Ok(names)
}

/// Sorted `/`-separated paths, relative to `dir`, of every non-directory
/// below it.
fn list_recursive(dir: &Path) -> CollectionResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).follow_links(true) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_dir() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let parts = relative
            .components()
            .map(|c| utf8_name(c.as_os_str().to_os_string()))
            .collect::<CollectionResult<Vec<_>>>()?;
        names.push(parts.join("/"));
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cask_store::InMemoryBlockStore;
    use cask_types::EMPTY_BLOCK_LOCATOR;
    use std::io::Cursor;

    fn setup(block_size: usize) -> (Arc<InMemoryBlockStore>, CollectionWriter) {
        let store = Arc::new(InMemoryBlockStore::new());
        let writer =
            CollectionWriter::new(store.clone(), CollectionConfig::with_block_size(block_size))
                .unwrap();
        (store, writer)
    }

    fn read_back(store: &Arc<InMemoryBlockStore>, text: &str) -> CollectionReader {
        CollectionReader::new(text, store.clone(), CollectionConfig::default()).unwrap()
    }

    /// root/{x.txt:"AAAA", sub/y.txt:"BBBB"}
    fn scenario_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.txt"), "AAAA").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("y.txt"), "BBBB").unwrap();
        dir
    }

    fn file_names(stream: &FinishedStream) -> Vec<&str> {
        stream.files.iter().map(|f| f.name.as_str()).collect()
    }

    // -----------------------------------------------------------------------
    // Manifest properties
    // -----------------------------------------------------------------------

    #[test]
    fn two_files_across_a_stream_boundary() {
        let (store, mut w) = setup(1024);
        w.start_new_file("a").unwrap();
        w.write(b"foo").unwrap();
        w.start_new_stream(".").unwrap();
        w.start_new_file("b").unwrap();
        w.write(b"bar").unwrap();

        let text = w.manifest_text().unwrap();
        let foo = Locator::for_data(b"foo");
        let bar = Locator::for_data(b"bar");
        assert_eq!(text, format!(". {foo} {bar} 0:3:a 3:3:b\n"));

        let mut r = read_back(&store, &text);
        let files: Vec<_> = r.all_files().unwrap().map(|f| (f.path(), f.size())).collect();
        assert_eq!(files, vec![("./a".to_string(), 3), ("./b".to_string(), 3)]);
        assert_eq!(r.read_file("a").unwrap(), b"foo");
        assert_eq!(r.read_file("b").unwrap(), b"bar");

        let blocks: Vec<Vec<u8>> = w
            .data_locators()
            .iter()
            .map(|l| store.get(l).unwrap())
            .collect();
        assert_eq!(blocks, vec![b"foo".to_vec(), b"bar".to_vec()]);
    }

    #[test]
    fn contiguous_writes_merge_into_one_span() {
        let (_, mut w) = setup(3);
        w.start_new_file("f").unwrap();
        w.write(b"ab").unwrap();
        w.write(b"cd").unwrap();
        let text = w.manifest_text().unwrap();
        assert_eq!(
            text,
            format!(". {} {} 0:4:f\n", Locator::for_data(b"abc"), Locator::for_data(b"d"))
        );
    }

    #[test]
    fn identical_content_is_listed_once() {
        let (_, mut w) = setup(4);
        w.write_file(Cursor::new(b"xxxx"), "a").unwrap();
        w.write_file(Cursor::new(b"xxxx"), "b").unwrap();
        assert_eq!(w.finished_streams().len(), 0);

        let text = w.manifest_text().unwrap();
        let x = Locator::for_data(b"xxxx");
        assert_eq!(text, format!(". {x} 0:4:a 0:4:b\n"));
        // The raw stream still saw the block twice.
        assert_eq!(w.data_locators(), vec![x.clone(), x]);
    }

    #[test]
    fn files_and_streams_come_out_sorted() {
        let (_, mut w) = setup(1024);
        w.start_new_stream("./zeta").unwrap();
        w.write_file(Cursor::new(b"2"), "z").unwrap();
        w.write_file(Cursor::new(b"1"), "a").unwrap();
        w.start_new_stream("./alpha").unwrap();
        w.write_file(Cursor::new(b"3"), "m").unwrap();

        let text = w.manifest_text().unwrap();
        let streams: Vec<_> = text.lines().map(|l| l.split(' ').next().unwrap()).collect();
        assert_eq!(streams, vec!["./alpha", "./zeta"]);
        assert!(text.contains(" 1:1:a 0:1:z\n"));
    }

    #[test]
    fn names_with_spaces_are_escaped() {
        let (store, mut w) = setup(1024);
        w.start_new_stream("my dir").unwrap();
        w.write_file(Cursor::new(b"data"), "a b").unwrap();
        let text = w.manifest_text().unwrap();
        assert!(text.starts_with("./my\\040dir "));
        assert!(text.ends_with(" 0:4:a\\040b\n"));

        let mut r = read_back(&store, &text);
        let entry = r.all_files().unwrap().next().unwrap();
        assert_eq!(entry.file.name, "a b");
        assert_eq!(entry.stream.name, "./my dir");
    }

    #[test]
    fn streams_without_files_are_dropped() {
        let (_, mut w) = setup(1024);
        w.start_new_stream("./nothing").unwrap();
        w.start_new_stream("./still-nothing").unwrap();
        assert_eq!(w.manifest_text().unwrap(), "");
        assert!(w.finished_streams().is_empty());
        assert!(w.data_locators().is_empty());
    }

    #[test]
    fn stream_of_empty_files_gets_sentinel() {
        let (_, mut w) = setup(1024);
        w.write_file(std::io::empty(), "e").unwrap();
        assert_eq!(
            w.manifest_text().unwrap(),
            format!(". {EMPTY_BLOCK_LOCATOR} 0:0:e\n")
        );
        assert_eq!(w.data_locators(), vec![Locator::empty_block()]);
    }

    #[test]
    fn manifest_text_is_already_normal() {
        let (store, mut w) = setup(5);
        w.write_file(Cursor::new(b"hello world"), "greeting").unwrap();
        w.write_file(Cursor::new(b"hello"), "again").unwrap();
        let text = w.manifest_text().unwrap();
        assert_eq!(read_back(&store, &text).manifest_text().unwrap(), text);
    }

    // -----------------------------------------------------------------------
    // Misuse
    // -----------------------------------------------------------------------

    #[test]
    fn unnamed_file_with_content_fails() {
        let (_, mut w) = setup(1024);
        w.write(b"orphan").unwrap();
        let err = w.finish_current_file().unwrap_err();
        assert!(matches!(err, CollectionError::UnnamedFile { len: 6, offset: 0, .. }));
    }

    #[test]
    fn unnamed_empty_file_is_a_no_op() {
        let (_, mut w) = setup(1024);
        w.finish_current_file().unwrap();
        w.finish_current_file().unwrap();
        assert_eq!(w.manifest_text().unwrap(), "");
    }

    #[test]
    fn finishing_twice_records_one_file() {
        let (_, mut w) = setup(1024);
        w.start_new_file("once").unwrap();
        w.write(b"1").unwrap();
        w.finish_current_file().unwrap();
        w.finish_current_file().unwrap();
        w.finish_current_stream().unwrap();
        assert_eq!(w.finished_streams()[0].files.len(), 1);
    }

    #[test]
    fn unnamed_stream_with_files_fails() {
        let (_, mut w) = setup(1024);
        w.write_file(Cursor::new(b"a"), "a").unwrap();
        w.finish_current_stream().unwrap();
        assert_eq!(w.current_stream_name(), None);

        w.write_file(Cursor::new(b"b"), "b").unwrap();
        let err = w.finish_current_stream().unwrap_err();
        assert!(matches!(err, CollectionError::UnnamedStream { len: 1, files: 1 }));
    }

    #[test]
    fn whitespace_in_names_is_rejected() {
        let (_, mut w) = setup(1024);
        assert!(matches!(
            w.start_new_file("bad\tname"),
            Err(CollectionError::IllegalName { kind: "file", .. })
        ));
        assert!(matches!(
            w.start_new_stream("bad\nstream"),
            Err(CollectionError::IllegalName { kind: "stream", .. })
        ));
    }

    #[test]
    fn second_queued_file_is_rejected() {
        let dir = scenario_tree();
        let (_, mut w) = setup(1024);
        w.queue_file(&dir.path().join("x.txt"), None).unwrap();
        let err = w.write_file(Cursor::new(b"b"), "b").unwrap_err();
        assert!(matches!(err, CollectionError::FileAlreadyQueued(_)));
        let err = w.queue_file(&dir.path().join("x.txt"), None).unwrap_err();
        assert!(matches!(err, CollectionError::FileAlreadyQueued(_)));
    }

    #[test]
    fn missing_file_propagates_io_error() {
        let (_, mut w) = setup(1024);
        let err = w.write_file_path("/definitely/not/here", None).unwrap_err();
        assert!(matches!(err, CollectionError::Io(_)));
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let store = Arc::new(InMemoryBlockStore::new());
        let err = CollectionWriter::new(store, CollectionConfig::with_block_size(0)).unwrap_err();
        assert!(matches!(err, CollectionError::InvalidConfig(_)));
    }

    // -----------------------------------------------------------------------
    // Buffering
    // -----------------------------------------------------------------------

    #[test]
    fn write_flushes_every_full_block() {
        let (store, mut w) = setup(4);
        w.start_new_file("f").unwrap();
        w.write(b"0123456789").unwrap();
        assert_eq!(store.put_count(), 2);
        assert_eq!(w.buffered_len(), 2);
        w.finish_current_stream().unwrap();
        assert_eq!(store.put_count(), 3);
        assert_eq!(w.buffered_len(), 0);
    }

    #[test]
    fn tree_writes_stay_within_one_block() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), vec![b'a'; 3]).unwrap();
        std::fs::write(dir.path().join("b"), vec![b'b'; 5]).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c"), vec![b'c'; 10]).unwrap();
        let total = 18usize;
        let block_size = 4usize;

        let (store, mut w) = setup(block_size);
        w.write_directory_tree(dir.path(), ".", 0).unwrap();
        assert!(w.buffered_len() < block_size);
        let text = w.manifest_text().unwrap();

        assert!(store.put_count() <= total.div_ceil(block_size));
        assert!(store.largest_block() <= block_size);

        let mut r = read_back(&store, &text);
        assert_eq!(r.read_file("nested/c").unwrap(), vec![b'c'; 10]);
        assert_eq!(r.read_file("b").unwrap(), vec![b'b'; 5]);
    }

    /// Yields one byte per `read` call.
    struct Trickle(usize);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.0 == 0 || buf.is_empty() {
                return Ok(0);
            }
            self.0 -= 1;
            buf[0] = b't';
            Ok(1)
        }
    }

    #[test]
    fn small_reads_at_default_block_size_stay_small() {
        let store = Arc::new(InMemoryBlockStore::new());
        let mut w = CollectionWriter::new(store.clone(), CollectionConfig::default()).unwrap();
        w.write_file(Trickle(200), "trickle").unwrap();
        for i in 0..50 {
            w.write_file(Cursor::new(b"x"), &format!("f{i:02}")).unwrap();
        }
        assert_eq!(w.buffered_len(), 250);
        // Never sized up to the 64 MiB block.
        assert!(w.data_buffer.capacity() <= READ_CHUNK);
        assert_eq!(store.put_count(), 0);

        let text = w.manifest_text().unwrap();
        let mut r = read_back(&store, &text);
        assert_eq!(r.read_file("trickle").unwrap(), vec![b't'; 200]);
        assert_eq!(r.read_file("f49").unwrap(), b"x");
        assert_eq!(store.put_count(), 1);
    }

    #[test]
    fn caller_keeps_borrowed_reader() {
        let (_, mut w) = setup(2);
        let mut source = Cursor::new(b"abcde".to_vec());
        w.write_file(&mut source, "f").unwrap();
        assert_eq!(source.position(), 5);
        source.set_position(0);
        w.write_file(&mut source, "g").unwrap();
        let text = w.manifest_text().unwrap();
        assert!(text.ends_with(" 0:5:f 5:5:g\n"));
    }

    // -----------------------------------------------------------------------
    // Trees
    // -----------------------------------------------------------------------

    #[test]
    fn unbounded_depth_makes_a_stream_per_directory() {
        let dir = scenario_tree();
        let (store, mut w) = setup(1024);
        w.write_directory_tree(dir.path(), ".", -1).unwrap();
        w.finish_current_stream().unwrap();

        let streams = w.finished_streams();
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].name, ".");
        assert_eq!(file_names(&streams[0]), vec!["x.txt"]);
        assert_eq!(streams[1].name, "./sub");
        assert_eq!(file_names(&streams[1]), vec!["y.txt"]);

        let text = w.manifest_text().unwrap();
        let a = Locator::for_data(b"AAAA");
        let b = Locator::for_data(b"BBBB");
        assert_eq!(text, format!(". {a} 0:4:x.txt\n./sub {b} 0:4:y.txt\n"));
        assert_eq!(read_back(&store, &text).read_file("sub/y.txt").unwrap(), b"BBBB");
    }

    #[test]
    fn zero_depth_flattens_into_one_stream() {
        let dir = scenario_tree();
        let (store, mut w) = setup(1024);
        w.write_directory_tree(dir.path(), ".", 0).unwrap();
        w.finish_current_stream().unwrap();

        let streams = w.finished_streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].name, ".");
        assert_eq!(file_names(&streams[0]), vec!["sub/y.txt", "x.txt"]);
        assert_eq!(streams[0].locators, vec![Locator::for_data(b"BBBBAAAA")]);

        // Path-qualified names resolve to their directory's stream once
        // normalized; the bytes stay where the flat stream put them.
        let text = w.manifest_text().unwrap();
        let block = Locator::for_data(b"BBBBAAAA");
        assert_eq!(text, format!(". {block} 4:4:x.txt\n./sub {block} 0:4:y.txt\n"));
        let mut r = read_back(&store, &text);
        assert_eq!(r.read_file("x.txt").unwrap(), b"AAAA");
        assert_eq!(r.read_file("sub/y.txt").unwrap(), b"BBBB");
    }

    #[test]
    fn depth_one_flattens_below_first_level() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("top"), "t").unwrap();
        std::fs::create_dir_all(dir.path().join("d1").join("d2")).unwrap();
        std::fs::write(dir.path().join("d1").join("mid"), "m").unwrap();
        std::fs::write(dir.path().join("d1").join("d2").join("deep"), "d").unwrap();

        let (_, mut w) = setup(1024);
        w.write_directory_tree(dir.path(), "./root", 1).unwrap();
        w.finish_current_stream().unwrap();

        let streams = w.finished_streams();
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].name, "./root");
        assert_eq!(file_names(&streams[0]), vec!["top"]);
        assert_eq!(streams[1].name, "./root/d1");
        assert_eq!(file_names(&streams[1]), vec!["d2/deep", "mid"]);
    }

    #[test]
    fn empty_directories_do_not_stall() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("empty").join("emptier")).unwrap();
        let (_, mut w) = setup(1024);
        w.write_directory_tree(dir.path(), ".", -1).unwrap();
        assert_eq!(w.manifest_text().unwrap(), "");
    }

    #[test]
    fn write_file_path_defaults_to_basename() {
        let dir = scenario_tree();
        let (_, mut w) = setup(1024);
        w.write_file_path(dir.path().join("x.txt"), None).unwrap();
        w.write_file_path(dir.path().join("sub").join("y.txt"), Some("renamed")).unwrap();
        w.finish_current_stream().unwrap();
        assert_eq!(file_names(&w.finished_streams()[0]), vec!["x.txt", "renamed"]);
    }

    #[test]
    fn empty_or_slashed_tree_names_root_child_streams() {
        for name in ["", "./", "."] {
            let dir = scenario_tree();
            let (store, mut w) = setup(1024);
            w.write_directory_tree(dir.path(), name, -1).unwrap();
            let text = w.manifest_text().unwrap();
            let streams: Vec<_> = w.finished_streams().iter().map(|s| s.name.as_str()).collect();
            assert_eq!(streams, vec![".", "./sub"], "tree name {name:?}");
            assert_eq!(read_back(&store, &text).read_file("sub/y.txt").unwrap(), b"BBBB");
        }

        let dir = scenario_tree();
        let (_, mut w) = setup(1024);
        w.write_directory_tree(dir.path(), "./top/", -1).unwrap();
        w.finish_current_stream().unwrap();
        let streams: Vec<_> = w.finished_streams().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(streams, vec!["./top", "./top/sub"]);
    }

    // -----------------------------------------------------------------------
    // Finish
    // -----------------------------------------------------------------------

    #[test]
    fn finish_stores_manifest_as_a_block() {
        let dir = scenario_tree();
        let (store, mut w) = setup(1024);
        w.write_directory_tree(dir.path(), ".", -1).unwrap();
        let locator = w.finish().unwrap();

        let stored = String::from_utf8(store.get(&locator).unwrap()).unwrap();
        let mut r = read_back(&store, &locator.to_string());
        assert_eq!(r.manifest_text().unwrap(), stored);
        assert_eq!(r.all_files().unwrap().count(), 2);
    }

    #[test]
    fn debug_format() {
        let (_, w) = setup(1024);
        let debug = format!("{w:?}");
        assert!(debug.contains("CollectionWriter"));
        assert!(debug.contains("buffered"));
    }
}
