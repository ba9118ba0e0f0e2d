use crate::config::CompilerConfig;
use crate::runner::ToolRunner;
use crate::{Result, ToolchainError};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

const CPP_EXTENSIONS: &[&str] = &["cpp", "cc", "cxx"];

/// Files produced by [`Compiler::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifacts {
    pub bitcode: PathBuf,
    pub ir: PathBuf,
    pub binary: PathBuf,
}

pub struct Compiler {
    config: CompilerConfig,
    runner: ToolRunner,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        let runner = ToolRunner::new(config.timeout());
        Self { config, runner }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// C sources, then C++ sources when enabled, each group sorted by path.
    pub fn discover_sources(&self) -> Vec<PathBuf> {
        let mut c_files = Vec::new();
        let mut cpp_files = Vec::new();
        for entry in WalkDir::new(&self.config.project_path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
        {
            let path = entry.into_path();
            let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
                continue;
            };
            if ext == "c" {
                c_files.push(path);
            } else if self.config.include_cpp && CPP_EXTENSIONS.iter().any(|cpp| *cpp == ext) {
                cpp_files.push(path);
            }
        }
        c_files.sort();
        cpp_files.sort();
        c_files.extend(cpp_files);
        debug!(count = c_files.len(), "discovered sources");
        c_files
    }

    pub fn build_flags(&self) -> Vec<String> {
        let mut flags = self.config.sanitize_flags();
        flags.push(self.config.optimization_flag());
        flags.push("-emit-llvm".to_string());
        flags.push("-c".to_string());
        flags.extend(self.config.define_flags());
        flags.extend(self.config.include_flags());
        flags.extend(self.config.extra_flags.iter().cloned());
        flags
    }

    /// Compile every discovered source into one bitcode file.
    ///
    /// clang refuses `-c -o` with several inputs, so more than one source is compiled into
    /// `objs/` next to `output` and linked.
    pub fn compile_to_bitcode(&self, output: &Path) -> Result<PathBuf> {
        let sources = self.discover_sources();
        let output = output.with_extension("bc");
        match sources.as_slice() {
            [] => Err(ToolchainError::NoSourcesFound(self.config.project_path.clone())),
            [source] => {
                let output = prepare_output(&output)?;
                let mut args = self.build_flags();
                args.push(source.display().to_string());
                args.push("-o".to_string());
                args.push(output.display().to_string());
                self.runner.run(&self.config.tools.clang, &args)?;
                info!(output = %output.display(), "compiled bitcode");
                Ok(output)
            }
            _ => {
                let objs = output
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."))
                    .join("objs");
                let objects = self.compile_individual(&sources, &objs)?;
                self.link_bitcode(&objects, &output)
            }
        }
    }

    /// Compile each source into its own bitcode file under `output_dir`.
    pub fn compile_individual(&self, sources: &[PathBuf], output_dir: &Path) -> Result<Vec<PathBuf>> {
        let flags = self.build_flags();
        let mut outputs = Vec::with_capacity(sources.len());
        for (index, source) in sources.iter().enumerate() {
            let stem = source
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "source".to_string());
            // Sources in different directories may share a stem.
            let output = prepare_output(&output_dir.join(format!("{:03}-{}.bc", index, stem)))?;
            let mut args = flags.clone();
            args.push(source.display().to_string());
            args.push("-o".to_string());
            args.push(output.display().to_string());
            self.runner.run(&self.config.tools.clang, &args)?;
            outputs.push(output);
        }
        info!(count = outputs.len(), "compiled individual bitcode files");
        Ok(outputs)
    }

    pub fn link_bitcode(&self, files: &[PathBuf], output: &Path) -> Result<PathBuf> {
        if files.is_empty() {
            return Err(ToolchainError::NoInputsProvided);
        }
        let output = prepare_output(&output.with_extension("bc"))?;
        let mut args: Vec<String> = files.iter().map(|f| f.display().to_string()).collect();
        args.push("-o".to_string());
        args.push(output.display().to_string());
        self.runner.run(&self.config.tools.llvm_link, &args)?;
        Ok(output)
    }

    /// Disassemble bitcode; the default output sits next to the input with a `.ll` extension.
    pub fn to_text_ir(&self, bitcode: &Path, output: Option<&Path>) -> Result<PathBuf> {
        require(bitcode)?;
        let output = match output {
            Some(path) => path.to_path_buf(),
            None => bitcode.with_extension("ll"),
        };
        let output = prepare_output(&output)?;
        self.runner.run(
            &self.config.tools.llvm_dis,
            [bitcode.as_os_str(), OsStr::new("-o"), output.as_os_str()],
        )?;
        Ok(output)
    }

    pub fn assemble(&self, ir: &Path, output: Option<&Path>) -> Result<PathBuf> {
        require(ir)?;
        let output = match output {
            Some(path) => path.to_path_buf(),
            None => ir.with_extension("bc"),
        };
        let output = prepare_output(&output)?;
        self.runner.run(
            &self.config.tools.llvm_as,
            [ir.as_os_str(), OsStr::new("-o"), output.as_os_str()],
        )?;
        Ok(output)
    }

    /// Run the IR verifier, returning its diagnostics as `VerificationFailed`.
    pub fn verify(&self, ir: &Path) -> Result<()> {
        require(ir)?;
        let output = self.runner.output(
            &self.config.tools.opt,
            [
                OsStr::new("-passes=verify"),
                OsStr::new("-disable-output"),
                ir.as_os_str(),
            ],
        )?;
        if output.status.success() {
            debug!(ir = %ir.display(), "verified");
            Ok(())
        } else {
            Err(ToolchainError::VerificationFailed {
                path: ir.to_path_buf(),
                diagnostics: output.stderr.trim().to_string(),
            })
        }
    }

    /// Compile text IR into an executable, linking the configured sanitizer runtimes.
    pub fn compile_ir(&self, ir: &Path, output: &Path, link_flags: &[String]) -> Result<PathBuf> {
        require(ir)?;
        let output = prepare_output(output)?;
        let mut args = self.config.sanitize_flags();
        args.push(ir.display().to_string());
        args.push("-o".to_string());
        args.push(output.display().to_string());
        args.extend(link_flags.iter().cloned());
        self.runner.run(&self.config.tools.clang, &args)?;
        info!(output = %output.display(), "compiled binary");
        Ok(output)
    }

    /// `program.bc` in `build_dir`. With `split`, even a single source goes through
    /// `llvm-link`.
    pub fn build_bitcode(&self, build_dir: &Path, split: bool) -> Result<PathBuf> {
        std::fs::create_dir_all(build_dir)?;
        if !split {
            return self.compile_to_bitcode(&build_dir.join("program.bc"));
        }
        let sources = self.discover_sources();
        if sources.is_empty() {
            return Err(ToolchainError::NoSourcesFound(self.config.project_path.clone()));
        }
        let objects = self.compile_individual(&sources, &build_dir.join("objs"))?;
        self.link_bitcode(&objects, &build_dir.join("program.bc"))
    }

    /// Compile, disassemble, optionally verify, and build the unmodified program.
    pub fn run(&self, build_dir: &Path, split: bool, verify: bool) -> Result<BuildArtifacts> {
        let bitcode = self.build_bitcode(build_dir, split)?;
        let ir = self.to_text_ir(&bitcode, Some(&build_dir.join("program.ll")))?;
        if verify {
            self.verify(&ir)?;
        }
        let binary = self.compile_ir(&ir, &build_dir.join("program"), &[])?;
        Ok(BuildArtifacts {
            bitcode,
            ir,
            binary,
        })
    }
}

fn require(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(ToolchainError::MissingFile(path.to_path_buf()))
    }
}

fn prepare_output(path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/util")).unwrap();
        fs::write(dir.path().join("src/main.c"), "int main(void) { return 0; }").unwrap();
        fs::write(dir.path().join("src/util/buf.c"), "").unwrap();
        fs::write(dir.path().join("src/util/vec.cpp"), "").unwrap();
        fs::write(dir.path().join("src/util/map.cc"), "").unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();
        dir
    }

    fn relative(dir: &Path, paths: Vec<PathBuf>) -> Vec<String> {
        paths
            .into_iter()
            .map(|p| p.strip_prefix(dir).unwrap().display().to_string())
            .collect()
    }

    #[test]
    fn test_discover_c_sources_only() {
        let dir = project();
        let compiler = Compiler::new(CompilerConfig::new(dir.path()));
        assert_eq!(
            relative(dir.path(), compiler.discover_sources()),
            vec!["src/main.c", "src/util/buf.c"]
        );
    }

    #[test]
    fn test_discover_cpp_sources_when_enabled() {
        let dir = project();
        let config = CompilerConfig {
            include_cpp: true,
            ..CompilerConfig::new(dir.path())
        };
        assert_eq!(
            relative(dir.path(), Compiler::new(config).discover_sources()),
            vec!["src/main.c", "src/util/buf.c", "src/util/map.cc", "src/util/vec.cpp"]
        );
    }

    #[test]
    fn test_build_flags_order() {
        let config = CompilerConfig {
            sanitizers: vec!["asan".into(), "ubsan".into()],
            opt_level: "O1".into(),
            defines: vec!["NDEBUG".into()],
            include_paths: vec!["inc".into()],
            extra_flags: vec!["-g".into()],
            ..CompilerConfig::default()
        };
        assert_eq!(
            Compiler::new(config).build_flags(),
            vec![
                "-fsanitize=address",
                "-fsanitize=undefined",
                "-O1",
                "-emit-llvm",
                "-c",
                "-DNDEBUG",
                "-Iinc",
                "-g"
            ]
        );
    }

    #[test]
    fn test_no_sources() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = Compiler::new(CompilerConfig::new(dir.path()));
        let err = compiler
            .compile_to_bitcode(&dir.path().join("out.bc"))
            .unwrap_err();
        assert!(matches!(err, ToolchainError::NoSourcesFound(_)));
        let err = compiler.run(&dir.path().join("build"), true, false).unwrap_err();
        assert!(matches!(err, ToolchainError::NoSourcesFound(_)));
    }

    #[test]
    fn test_link_without_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = Compiler::new(CompilerConfig::default());
        let err = compiler.link_bitcode(&[], &dir.path().join("all")).unwrap_err();
        assert!(matches!(err, ToolchainError::NoInputsProvided));
    }

    #[test]
    fn test_missing_inputs() {
        let compiler = Compiler::new(CompilerConfig::default());
        let missing = Path::new("/definitely/not/here.bc");
        assert!(matches!(
            compiler.to_text_ir(missing, None),
            Err(ToolchainError::MissingFile(_))
        ));
        assert!(matches!(
            compiler.assemble(missing, None),
            Err(ToolchainError::MissingFile(_))
        ));
        assert!(matches!(
            compiler.verify(missing),
            Err(ToolchainError::MissingFile(_))
        ));
        assert!(matches!(
            compiler.compile_ir(missing, Path::new("a.out"), &[]),
            Err(ToolchainError::MissingFile(_))
        ));
    }
}
