use std::path::PathBuf;
use std::rc::Rc;

use crate::backend::IniBackend;
use crate::cascade::CascadeResolver;
use crate::config::Config;
use crate::error::ConfigError;
use crate::file::SearchPathResolver;
use crate::locale::{EnvLocale, LocaleProvider};
use crate::types::SearchPath;

/// Builder for opening a cascaded configuration.
///
/// Three independent settings decide which files take part:
///
/// - **Discovery**: [`search_paths()`](Self::search_paths) or a custom
///   [`resolver()`](Self::resolver) finds every candidate file.
/// - **Globals**: [`include_globals()`](Self::include_globals) folds the
///   shared globals file underneath.
/// - **Merge stack**: [`extra_config_files()`](Self::extra_config_files)
///   layers explicit files on top. The last one receives writes.
pub struct ConfigBuilder {
    app_name: Option<String>,
    file_name: Option<String>,
    search_paths: Option<Vec<SearchPath>>,
    save_path: Option<SearchPath>,
    executable_dirs: Vec<PathBuf>,
    restricted: Vec<String>,
    resolver: Option<Rc<dyn CascadeResolver>>,
    locale: Option<Rc<dyn LocaleProvider>>,
    include_globals: bool,
    globals_name: Option<String>,
    extra_config_files: Vec<PathBuf>,
    read_defaults: bool,
    dollar_expansion: bool,
    shell_expansion: bool,
    file_mode: Option<u32>,
    honor_kiosk: bool,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            app_name: None,
            file_name: None,
            search_paths: None,
            save_path: None,
            executable_dirs: Vec::new(),
            restricted: Vec::new(),
            resolver: None,
            locale: None,
            include_globals: false,
            globals_name: None,
            extra_config_files: Vec::new(),
            read_defaults: true,
            dollar_expansion: false,
            shell_expansion: true,
            file_mode: None,
            honor_kiosk: true,
        }
    }

    /// Set the application name. The file name defaults to `"{app_name}rc"`.
    pub fn app_name(mut self, name: &str) -> Self {
        self.app_name = Some(name.to_string());
        self
    }

    /// The configuration's file name, relative to every search directory.
    /// An absolute path is used as the only local file.
    pub fn file_name(mut self, name: &str) -> Self {
        self.file_name = Some(name.to_string());
        self
    }

    /// Replace the default search paths entirely.
    ///
    /// Paths are listed in **priority-ascending** order: the last entry has
    /// the highest priority and receives writes unless
    /// [`save_path()`](Self::save_path) says otherwise.
    pub fn search_paths(mut self, paths: Vec<SearchPath>) -> Self {
        self.search_paths = Some(paths);
        self
    }

    /// Append a search path. If no paths have been set yet, starts from
    /// `[System, Platform]`.
    pub fn add_search_path(mut self, path: SearchPath) -> Self {
        self.search_paths
            .get_or_insert_with(|| vec![SearchPath::System, SearchPath::Platform])
            .push(path);
        self
    }

    /// Where a new local file is created.
    pub fn save_path(mut self, path: SearchPath) -> Self {
        self.save_path = Some(path);
        self
    }

    /// A directory prepended to `PATH` for `$(cmd)` expansion.
    pub fn executable_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.executable_dirs.push(dir.into());
        self
    }

    /// Lock the configuration named `name` regardless of file content.
    pub fn restrict(mut self, name: &str) -> Self {
        self.restricted.push(name.to_string());
        self
    }

    /// Use a custom resolver. Search paths, save path, restrictions and
    /// executable directories set on the builder are then ignored.
    pub fn resolver(mut self, resolver: Rc<dyn CascadeResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Locale source (default: [`EnvLocale`]).
    pub fn locale(mut self, provider: Rc<dyn LocaleProvider>) -> Self {
        self.locale = Some(provider);
        self
    }

    /// Fold the shared globals file below the configuration and write
    /// global entries back to it.
    pub fn include_globals(mut self, include: bool) -> Self {
        self.include_globals = include;
        self
    }

    /// Name of the shared globals file (default: `kdeglobals`).
    pub fn globals_name(mut self, name: &str) -> Self {
        self.globals_name = Some(name.to_string());
        self
    }

    /// Files folded on top of the cascade, lowest priority first.
    pub fn extra_config_files(mut self, files: Vec<PathBuf>) -> Self {
        self.extra_config_files = files;
        self
    }

    /// Fold less specific files too (default: `true`). Off reads only the
    /// local file.
    pub fn read_defaults(mut self, read: bool) -> Self {
        self.read_defaults = read;
        self
    }

    /// Expand every value on read, not only `[$e]` entries.
    pub fn dollar_expansion(mut self, always: bool) -> Self {
        self.dollar_expansion = always;
        self
    }

    /// Allow `$(cmd)` in expanded values (default: `true`).
    pub fn shell_expansion(mut self, enabled: bool) -> Self {
        self.shell_expansion = enabled;
        self
    }

    /// Permission bits for newly created files.
    pub fn file_mode(mut self, mode: u32) -> Self {
        self.file_mode = Some(mode);
        self
    }

    /// Honour `[$i]` markers (default: `true`).
    pub fn honor_kiosk(mut self, honor: bool) -> Self {
        self.honor_kiosk = honor;
        self
    }

    fn effective_file_name(&self) -> Result<String, ConfigError> {
        if let Some(name) = &self.file_name {
            return Ok(name.clone());
        }
        match &self.app_name {
            Some(app) => Ok(format!("{app}rc")),
            None => Err(ConfigError::FileNameRequired),
        }
    }

    fn effective_resolver(&self) -> Rc<dyn CascadeResolver> {
        if let Some(resolver) = &self.resolver {
            return Rc::clone(resolver);
        }
        let mut resolver = match &self.search_paths {
            Some(paths) => SearchPathResolver::new(paths.clone()),
            None => SearchPathResolver::default(),
        };
        if let Some(path) = &self.save_path {
            resolver = resolver.save_to(path.clone());
        }
        for name in &self.restricted {
            resolver = resolver.restrict(name);
        }
        for dir in &self.executable_dirs {
            resolver = resolver.executable_dir(dir.clone());
        }
        Rc::new(resolver)
    }

    /// Fold every layer and return the configuration.
    ///
    /// Missing or unreadable files are skipped; only a missing file name is
    /// an error.
    pub fn open(self) -> Result<Config, ConfigError> {
        let file_name = self.effective_file_name()?;
        let provider = self
            .locale
            .clone()
            .unwrap_or_else(|| Rc::new(EnvLocale) as Rc<dyn LocaleProvider>);

        let mut backend = IniBackend::new(self.effective_resolver(), provider, &file_name);
        if let Some(name) = &self.globals_name {
            backend.globals_name = name.clone();
        }
        backend.include_globals = self.include_globals;
        backend.read_defaults = self.read_defaults;
        backend.merge_stack = self.extra_config_files;
        backend.honor_kiosk = self.honor_kiosk;
        backend.file_mode = self.file_mode;

        Ok(Config::with_backend(
            Box::new(backend),
            self.dollar_expansion,
            self.shell_expansion,
        ))
    }
}
