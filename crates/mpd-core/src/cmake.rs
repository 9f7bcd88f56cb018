//! [`BuildTool`] implementation for CMake and CTest

use crate::host::{run, BuildTool, ConfigureRequest, ExternalToolError};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// The `cmake` and `ctest` executables.
#[derive(Debug, Clone)]
pub struct CMake {
    cmake: PathBuf,
    ctest: PathBuf,
}

impl CMake {
    #[must_use]
    pub fn new(cmake: impl Into<PathBuf>, ctest: impl Into<PathBuf>) -> Self {
        Self {
            cmake: cmake.into(),
            ctest: ctest.into(),
        }
    }
}

impl Default for CMake {
    fn default() -> Self {
        Self::new("cmake", "ctest")
    }
}

fn define(name: &str, value: &Path) -> OsString {
    let mut arg = OsString::from(format!("-D{name}="));
    arg.push(value);
    arg
}

/// Arguments for the configure step, using the generated `default` preset.
fn configure_args(request: &ConfigureRequest<'_>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--preset".into(),
        "default".into(),
        request.source.into(),
        "-B".into(),
        request.build.into(),
        define("CMAKE_INSTALL_PREFIX", request.install_prefix),
        "-G".into(),
        request.generator.cmake_name().into(),
    ];
    if let Some(toolchain) = request.toolchain {
        args.push(define("CMAKE_C_COMPILER", &toolchain.c));
        args.push(define("CMAKE_CXX_COMPILER", &toolchain.cxx));
    }
    args
}

fn build_args(
    build: &Path,
    parallelism: Option<usize>,
    target: Option<&str>,
    extra_args: &[String],
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--build".into(), build.into()];
    if let Some(target) = target {
        args.push("--target".into());
        args.push(target.into());
    }
    if let Some(jobs) = parallelism {
        args.push("--parallel".into());
        args.push(jobs.to_string().into());
    }
    if !extra_args.is_empty() {
        args.push("--".into());
        args.extend(extra_args.iter().map(OsString::from));
    }
    args
}

impl BuildTool for CMake {
    fn configure(&self, request: &ConfigureRequest<'_>) -> Result<(), ExternalToolError> {
        run(Command::new(&self.cmake).args(configure_args(request)))
    }

    fn build(
        &self,
        build: &Path,
        parallelism: Option<usize>,
        target: Option<&str>,
        extra_args: &[String],
    ) -> Result<(), ExternalToolError> {
        run(Command::new(&self.cmake).args(build_args(build, parallelism, target, extra_args)))
    }

    fn test(&self, build: &Path, parallelism: Option<usize>) -> Result<(), ExternalToolError> {
        let mut command = Command::new(&self.ctest);
        command.arg("--test-dir").arg(build).arg("--output-on-failure");
        if let Some(jobs) = parallelism {
            command.arg("-j").arg(jobs.to_string());
        }
        run(&mut command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Generator;
    use crate::project::Toolchain;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_configure_args() {
        let toolchain = Toolchain {
            c: PathBuf::from("/usr/bin/gcc"),
            cxx: PathBuf::from("/usr/bin/g++"),
        };
        let request = ConfigureRequest {
            source: Path::new("/work/srcs"),
            build: Path::new("/work/build"),
            install_prefix: Path::new("/work/local/install"),
            generator: Generator::Ninja,
            toolchain: Some(&toolchain),
        };
        assert_eq!(
            strings(configure_args(&request)),
            vec![
                "--preset",
                "default",
                "/work/srcs",
                "-B",
                "/work/build",
                "-DCMAKE_INSTALL_PREFIX=/work/local/install",
                "-G",
                "Ninja",
                "-DCMAKE_C_COMPILER=/usr/bin/gcc",
                "-DCMAKE_CXX_COMPILER=/usr/bin/g++",
            ]
        );
    }

    #[test]
    fn test_build_args() {
        let args = build_args(
            Path::new("/work/build"),
            Some(8),
            Some("install"),
            &["-k".to_string()],
        );
        assert_eq!(
            strings(args),
            vec!["--build", "/work/build", "--target", "install", "--parallel", "8", "--", "-k"]
        );
        assert_eq!(
            strings(build_args(Path::new("b"), None, None, &[])),
            vec!["--build", "b"]
        );
    }
}
