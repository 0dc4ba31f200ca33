//! Collaborator interfaces around the core: the data loader the parser uses
//! to resolve inner classes, a classpath implementation over directories and
//! jars, and the handoff that surrenders generated bytes to a host defined
//! class injector under a reserved unique name.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::class::attribute::AttributeFactory;
use crate::class::class_file::ClassFile;
use crate::error::{Error, Result};

/// Resolves a dotted class name to a byte stream, used while parsing to
/// chase inner class definitions. `None` means the class is unknown.
pub trait ClassDataLoader {
    fn get_class_data(&mut self, dotted_name: &str) -> Option<Box<dyn Read>>;
}

enum PathEntry {
    Directory(PathBuf),
    Jar(Box<ZipArchive<BufReader<File>>>),
}

/// A [ClassDataLoader] over class directories and jar files.
#[derive(Default)]
pub struct ClassPathLoader {
    entries: Vec<PathEntry>,
}

impl ClassPathLoader {
    pub fn new() -> ClassPathLoader {
        ClassPathLoader::default()
    }

    pub fn add_directory<P: AsRef<Path>>(&mut self, path: P) {
        self.entries
            .push(PathEntry::Directory(path.as_ref().to_path_buf()));
    }

    pub fn add_jar<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let archive = ZipArchive::new(BufReader::new(File::open(path.as_ref())?))
            .map_err(|e| Error::malformed(format!("{}: {}", path.as_ref().display(), e)))?;
        self.entries.push(PathEntry::Jar(Box::new(archive)));
        Ok(())
    }

    /// Walk a tree, adding every jar found plus the root itself as a class
    /// directory.
    pub fn scan_tree<P: AsRef<Path>>(&mut self, root: P) -> Result<()> {
        self.add_directory(root.as_ref());

        for entry in WalkDir::new(root.as_ref()) {
            let entry = entry.map_err(|e| Error::malformed(e.to_string()))?;
            if entry.path().extension().and_then(OsStr::to_str) == Some("jar") {
                debug!("adding jar {}", entry.path().display());
                self.add_jar(entry.path())?;
            }
        }

        Ok(())
    }
}

impl ClassDataLoader for ClassPathLoader {
    fn get_class_data(&mut self, dotted_name: &str) -> Option<Box<dyn Read>> {
        let relative = format!("{}.class", dotted_name.replace('.', "/"));

        for entry in &mut self.entries {
            match entry {
                PathEntry::Directory(root) => {
                    let path = root.join(&relative);
                    if let Ok(file) = File::open(&path) {
                        return Some(Box::new(BufReader::new(file)));
                    }
                }
                PathEntry::Jar(archive) => match archive.by_name(&relative) {
                    Ok(mut file) => {
                        let mut bytes = Vec::with_capacity(file.size() as usize);
                        if file.read_to_end(&mut bytes).is_err() {
                            return None;
                        }
                        return Some(Box::new(Cursor::new(bytes)));
                    }
                    Err(ZipError::FileNotFound) => {}
                    Err(e) => {
                        warn!("failed to read {} from jar: {}", relative, e);
                        return None;
                    }
                },
            }
        }

        if !dotted_name.starts_with('[') {
            warn!("unable to find class {} in class path", dotted_name);
        }
        None
    }
}

/// Parse `name` and, transitively, every inner class its InnerClasses table
/// mentions. The returned map doubles as the cycle breaker: an inner class
/// that points back at its outer is loaded exactly once.
pub fn load_class_tree(
    name: &str,
    loader: &mut dyn ClassDataLoader,
    factory: Option<&dyn AttributeFactory>,
) -> Result<HashMap<String, ClassFile>> {
    let mut loaded: HashMap<String, ClassFile> = HashMap::new();
    let mut queue = vec![name.replace('/', ".")];

    while let Some(target) = queue.pop() {
        if loaded.contains_key(&target) {
            continue;
        }

        let mut stream = loader
            .get_class_data(&target)
            .ok_or_else(|| Error::Unresolved(format!("class data for {}", target)))?;
        let class = ClassFile::read_with_factory(&mut stream, factory)?;

        for spec in class.inner_classes() {
            queue.push(spec.inner.replace('/', "."));
        }

        loaded.insert(target, class);
    }

    Ok(loaded)
}

/// Accepts finished class bytes and makes them live in some host. Failures
/// are the host's own error type, reported unchanged.
///
/// Implementations are expected to reserve each name before defining it so
/// concurrent generations cannot collide, and to cap how many classes one
/// internal loader defines (on the order of 100) so abandoned classes can be
/// unloaded with their loader.
pub trait ClassInjector {
    type Handle;
    type Error;

    fn define_class(
        &mut self,
        name: &str,
        bytes: &[u8],
    ) -> std::result::Result<Self::Handle, Self::Error>;
}

lazy_static! {
    static ref RESERVED_NAMES: Mutex<(HashSet<String>, HashMap<String, u64>)> =
        Mutex::new((HashSet::new(), HashMap::new()));
}

/// Reserve a fresh generated class name derived from `base` (dotted form).
/// Process-wide: two callers can never be handed the same name.
pub fn unique_class_name(base: &str) -> String {
    let base = base.replace('/', ".");
    let mut guard = RESERVED_NAMES.lock();
    let (reserved, counters) = &mut *guard;

    loop {
        let counter = counters.entry(base.clone()).or_insert(0);
        let candidate = format!("{}${}", base, counter);
        *counter += 1;

        if reserved.insert(candidate.clone()) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_names_never_repeat() {
        let a = unique_class_name("org.example.Gen");
        let b = unique_class_name("org.example.Gen");
        let c = unique_class_name("org/example/Gen");
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
        assert!(a.starts_with("org.example.Gen$"));
    }
}
