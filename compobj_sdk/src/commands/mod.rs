//! Package manager detection and command lines

use compobj_base::strategies::CommandRunner;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    Yum,
    Zypper,
    Apk,
    Pkg,
}

/// Probe order: the first manager whose binaries are all present wins
const PROBES: &[(PackageManager, &[&str])] = &[
    (PackageManager::Apt, &["apt-get", "dpkg-query"]),
    (PackageManager::Dnf, &["dnf", "rpm"]),
    (PackageManager::Yum, &["yum", "rpm"]),
    (PackageManager::Zypper, &["zypper", "rpm"]),
    (PackageManager::Apk, &["apk"]),
    (PackageManager::Pkg, &["pkg"]),
];

impl PackageManager {
    pub fn detect(commands: &dyn CommandRunner) -> Option<Self> {
        PROBES
            .iter()
            .find(|(_, binaries)| binaries.iter().all(|b| commands.is_available(b)))
            .map(|(manager, _)| *manager)
    }

    pub fn name(self) -> &'static str {
        match self {
            PackageManager::Apt => "apt",
            PackageManager::Dnf => "dnf",
            PackageManager::Yum => "yum",
            PackageManager::Zypper => "zypper",
            PackageManager::Apk => "apk",
            PackageManager::Pkg => "pkg",
        }
    }

    /// Command listing installed package names
    pub fn list_installed(self) -> (&'static str, &'static [&'static str]) {
        match self {
            PackageManager::Apt => ("dpkg-query", &["-W", "-f=${Package} ${db:Status-Status}\\n"]),
            PackageManager::Dnf | PackageManager::Yum | PackageManager::Zypper => {
                ("rpm", &["-qa", "--qf", "%{NAME}\\n"])
            }
            PackageManager::Apk => ("apk", &["info"]),
            PackageManager::Pkg => ("pkg", &["query", "%n"]),
        }
    }

    pub fn parse_installed(self, stdout: &str) -> HashSet<String> {
        stdout
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let name = fields.next()?;
                if self == PackageManager::Apt && fields.next() != Some("installed") {
                    return None;
                }
                Some(name.to_string())
            })
            .collect()
    }

    pub fn install(self, package: &str) -> (&'static str, Vec<String>) {
        let (program, args): (&str, &[&str]) = match self {
            PackageManager::Apt => ("apt-get", &["install", "-y"]),
            PackageManager::Dnf => ("dnf", &["install", "-y"]),
            PackageManager::Yum => ("yum", &["install", "-y"]),
            PackageManager::Zypper => ("zypper", &["--non-interactive", "install"]),
            PackageManager::Apk => ("apk", &["add"]),
            PackageManager::Pkg => ("pkg", &["install", "-y"]),
        };
        (program, with_package(args, package))
    }

    pub fn remove(self, package: &str) -> (&'static str, Vec<String>) {
        let (program, args): (&str, &[&str]) = match self {
            PackageManager::Apt => ("apt-get", &["remove", "-y"]),
            PackageManager::Dnf => ("dnf", &["remove", "-y"]),
            PackageManager::Yum => ("yum", &["remove", "-y"]),
            PackageManager::Zypper => ("zypper", &["--non-interactive", "remove"]),
            PackageManager::Apk => ("apk", &["del"]),
            PackageManager::Pkg => ("pkg", &["delete", "-y"]),
        };
        (program, with_package(args, package))
    }
}

fn with_package(args: &[&str], package: &str) -> Vec<String> {
    args.iter()
        .map(|a| a.to_string())
        .chain(std::iter::once(package.to_string()))
        .collect()
}
