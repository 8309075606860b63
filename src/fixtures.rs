#[cfg(test)]
pub mod test {
    use std::fs;
    use std::path::{Path, PathBuf};

    use crate::cascade::CascadeResolver;

    /// Resolver over explicit directories, most relevant first. Writes go to
    /// the first directory.
    #[derive(Debug, Clone)]
    pub struct DirResolver {
        pub dirs: Vec<PathBuf>,
        pub restricted: Vec<String>,
    }

    impl DirResolver {
        pub fn new(dirs: &[&Path]) -> Self {
            Self {
                dirs: dirs.iter().map(|d| d.to_path_buf()).collect(),
                restricted: Vec::new(),
            }
        }
    }

    impl CascadeResolver for DirResolver {
        fn find_all(&self, name: &str) -> Vec<PathBuf> {
            self.dirs
                .iter()
                .map(|d| d.join(name))
                .filter(|p| p.is_file())
                .collect()
        }

        fn save_path(&self, name: &str) -> Option<PathBuf> {
            self.dirs.first().map(|d| d.join(name))
        }

        fn is_restricted(&self, name: &str) -> bool {
            self.restricted.iter().any(|r| r == name)
        }
    }

    pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn read_file(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn dir_resolver_lists_existing_files_in_order() {
        let a = tempfile::TempDir::new().unwrap();
        let b = tempfile::TempDir::new().unwrap();
        write_file(b.path(), "apprc", "k=v\n");
        let resolver = DirResolver::new(&[a.path(), b.path()]);
        assert_eq!(resolver.find_all("apprc"), vec![b.path().join("apprc")]);
        assert_eq!(resolver.save_path("apprc"), Some(a.path().join("apprc")));
    }
}
