//! Known repositories and suites that `clone` can resolve by name

use std::collections::BTreeMap;

/// Where a suite's repositories are hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    GitHub(&'static str),
    Redmine,
}

impl Host {
    #[must_use]
    pub fn url(self, repo: &str) -> String {
        match self {
            Self::GitHub(org) => format!("https://github.com/{org}/{repo}.git"),
            Self::Redmine => format!("https://cdcvs.fnal.gov/projects/{repo}"),
        }
    }
}

/// A named collection of repositories cloned together.
#[derive(Debug, Clone, Copy)]
pub struct Suite {
    pub name: &'static str,
    pub host: Host,
    pub repos: &'static [&'static str],
}

impl Suite {
    /// Repository name -> URL.
    #[must_use]
    pub fn repositories(&self) -> BTreeMap<String, String> {
        self.repos
            .iter()
            .map(|repo| ((*repo).to_string(), self.host.url(repo)))
            .collect()
    }
}

// Listed alphabetically.
pub const SUITES: &[Suite] = &[
    Suite {
        name: "art",
        host: Host::GitHub("art-framework-suite"),
        repos: &[
            "art",
            "canvas",
            "cetlib",
            "cetlib-except",
            "fhicl-cpp",
            "hep-concurrency",
            "messagefacility",
        ],
    },
    Suite {
        name: "artdaq",
        host: Host::GitHub("art-daq"),
        repos: &[
            "artdaq_core",
            "artdaq_core_demo",
            "artdaq_daqinterface",
            "artdaq_database",
            "artdaq_epics_plugin",
            "artdaq_ganglia_plugin",
            "artdaq_mfextensions",
            "artdaq_mpich_plugin",
            "artdaq_utilities",
        ],
    },
    Suite {
        name: "critic",
        host: Host::GitHub("art-framework-suite"),
        repos: &[
            "art",
            "art-root-io",
            "canvas",
            "canvas-root-io",
            "cetlib",
            "cetlib-except",
            "critic",
            "fhicl-cpp",
            "fhicl-py",
            "gallery",
            "hep-concurrency",
            "messagefacility",
        ],
    },
    Suite {
        name: "dune",
        host: Host::GitHub("DUNE"),
        repos: &[
            "duneana",
            "dunecalib",
            "dunecore",
            "dunedataprep",
            "duneexamples",
            "duneopdet",
            "duneprototypes",
            "dunereco",
            "dunesim",
            "dunesw",
            "duneutil",
            "protoduneana",
        ],
    },
    Suite {
        name: "gallery",
        host: Host::GitHub("art-framework-suite"),
        repos: &[
            "canvas",
            "canvas-root-io",
            "cetlib",
            "cetlib-except",
            "fhicl-cpp",
            "fhicl-py",
            "gallery",
            "hep-concurrency",
            "messagefacility",
        ],
    },
    Suite {
        name: "larsoft",
        host: Host::GitHub("LArSoft"),
        repos: &[
            "larana",
            "larcore",
            "lardata",
            "lareventdisplay",
            "larevt",
            "larexamples",
            "larfinder",
            "larg4",
            "larpandora",
            "larreco",
            "larrecodnn",
            "larsim",
            "larsimdnn",
            "larsimrad",
            "larsoft",
            "larwirecell",
        ],
    },
    Suite {
        name: "larsoftobj",
        host: Host::GitHub("LArSoft"),
        repos: &[
            "larcorealg",
            "larcoreobj",
            "lardataalg",
            "lardataobj",
            "larsoftobj",
            "larvecutils",
        ],
    },
    Suite {
        name: "nu",
        host: Host::GitHub("NuSoftHEP"),
        repos: &[
            "nuevdb",
            "nufinder",
            "nug4",
            "nugen",
            "nurandom",
            "nusimdata",
            "nutools",
        ],
    },
    Suite {
        name: "sbn",
        host: Host::GitHub("SBNSoftware"),
        repos: &[
            "icarus_signal_processing",
            "icarusalg",
            "icaruscode",
            "icarusutil",
            "sbnanaobj",
            "sbnci",
            "sbncode",
            "sbndcode",
            "sbndutil",
            "sbnobj",
        ],
    },
    Suite {
        name: "sbndaq",
        host: Host::GitHub("SBNSoftware"),
        repos: &[
            "sbndaq",
            "sbndaq_artdaq",
            "sbndaq_artdaq_core",
            "sbndaq_decode",
            "sbndaq_minargon",
            "sbndaq_online",
            "sbndaq_xporter",
        ],
    },
    Suite {
        name: "uboone",
        host: Host::Redmine,
        repos: &[
            "ubana",
            "ubcore",
            "ubcrt",
            "ubcv",
            "ubevt",
            "ublite",
            "ubobj",
            "uboonecode",
            "uboonedata",
            "ubraw",
            "ubreco",
            "ubsim",
            "ubutil",
        ],
    },
];

/// Repositories known by name that belong to no suite: (host, names).
const EXTRAS: &[(Host, &[&str])] = &[
    (Host::GitHub("FNALssi"), &["cetmodules"]),
    (Host::GitHub("art-framework-suite"), &["art-g4tk", "ifdh-art"]),
    (
        Host::GitHub("NuSoftHEP"),
        &["geant4reweight", "nusystematics", "systematicstools"],
    ),
    (
        Host::GitHub("DUNE"),
        &["duneanaobj", "dunepdlegacy", "garana", "garsoft", "sandreco", "webevd"],
    ),
    (
        Host::GitHub("SBNSoftware"),
        &["sbnana", "sbndaq_artdaq_core", "sbndata", "sbndqm"],
    ),
    (
        Host::GitHub("LArSoft"),
        &["larbatch", "larnusystematics", "larpandoracontent", "larutils"],
    ),
];

#[must_use]
pub fn suite(name: &str) -> Option<&'static Suite> {
    SUITES.iter().find(|suite| suite.name == name)
}

/// Every repository known by name -> URL.
#[must_use]
pub fn known_repositories() -> BTreeMap<String, String> {
    let mut known = BTreeMap::new();
    for suite in SUITES {
        known.extend(suite.repositories());
    }
    for (host, names) in EXTRAS {
        known.extend(names.iter().map(|name| ((*name).to_string(), host.url(name))));
    }
    known
}

/// Directory name for a repository URL: the last path segment without `.git`.
#[must_use]
pub fn directory_name(url: &str) -> String {
    let path = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest.split_once('/').map_or("", |(_, path)| path));
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let last = path
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or_default();
    last.strip_suffix(".git").unwrap_or(last).to_string()
}

/// Resolve a known repository name or a URL into (directory name, URL).
#[must_use]
pub fn resolve(spec: &str) -> (String, String) {
    match known_repositories().remove(spec) {
        Some(url) => (spec.to_string(), url),
        None => (directory_name(spec), spec.to_string()),
    }
}
