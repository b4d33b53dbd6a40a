//! Test fixtures: a sample package, its changelog and Homebrew formula, and
//! `brew bottle --json` output.

use crate::util::hash::sha256_bytes;

/// A small Cabal package with a library and a test suite.
pub const SAMPLE_CABAL: &str = r#"cabal-version:      2.4
name:               sample-project
version:            0.1.2
synopsis:           A sample project used in tests
license:            MIT
author:             Sample Author
maintainer:         sample@example.com
build-type:         Simple
extra-doc-files:    CHANGELOG.md

-- The library everything else builds on
library
    exposed-modules:  Sample
    build-depends:    base >=4.13 && <5
                    , text
                    , containers >=0.6
    hs-source-dirs:   src
    default-language: Haskell2010

test-suite sample-project-test
    type:             exitcode-stdio-1.0
    main-is:          Main.hs
    hs-source-dirs:   test
    build-depends:    sample-project, tasty
    default-language: Haskell2010
"#;

/// Changelog whose latest section is 0.1.2.
pub const SAMPLE_CHANGELOG: &str = "# Changelog

## [0.1.2] - 2024-03-10

- Fixed parsing of empty input
- Faster startup

## [0.1.1] - 2024-02-01

- Added `--json` output

## [0.1.0] - 2024-01-15

- Initial release
";

/// Formula for 0.1.2 without a bottle block.
pub const SAMPLE_FORMULA: &str = r##"class SampleProject < Formula
  desc "A sample project used in tests"
  homepage "https://github.com/owner/sample-project"
  url "https://hackage.haskell.org/package/sample-project-0.1.2/sample-project-0.1.2.tar.gz"
  sha256 "abc123"
  license "MIT"

  depends_on "cabal-install" => :build
  depends_on "ghc" => :build

  def install
    system "cabal", "v2-update"
    system "cabal", "v2-install", *std_cabal_v2_args
  end

  test do
    system "#{bin}/sample-project", "--version"
  end
end
"##;

/// Formula for 0.1.2 with bottles for two architectures.
pub const FORMULA_WITH_BOTTLE: &str = r#"class SampleProject < Formula
  desc "A sample project used in tests"
  homepage "https://github.com/owner/sample-project"
  url "https://hackage.haskell.org/package/sample-project-0.1.2/sample-project-0.1.2.tar.gz"
  sha256 "abc123"
  license "MIT"

  bottle do
    root_url "https://github.com/owner/sample-project/releases/download/v0.1.2"
    rebuild 1
    sha256 cellar: :any, arm64_sonoma: "1111111111111111111111111111111111111111111111111111111111111111"
    sha256 cellar: :any_skip_relocation, x86_64_linux: "2222222222222222222222222222222222222222222222222222222222222222"
  end

  depends_on "cabal-install" => :build
  depends_on "ghc" => :build

  def install
    system "cabal", "v2-update"
    system "cabal", "v2-install", *std_cabal_v2_args
  end
end
"#;

/// `brew bottle --json` output for a single bottle of `name`.
pub fn bottle_json(name: &str, version: &str, tag: &str, local_filename: &str) -> String {
    let sha256 = sha256_bytes(local_filename.as_bytes());
    serde_json::json!({
        name: {
            "formula": {
                "name": name,
                "pkg_version": version,
            },
            "bottle": {
                "root_url": "https://ghcr.io/v2/homebrew/core",
                "cellar": ":any",
                "tags": {
                    tag: {
                        "filename": format!("{}-{}.{}.bottle.tar.gz", name, version, tag),
                        "local_filename": local_filename,
                        "sha256": sha256,
                    }
                }
            }
        }
    })
    .to_string()
}
