use assert_cmd::Command;
use insta_cmd::get_cargo_bin;

pub fn transdoc_cmd() -> Command {
	let mut cmd = Command::new(get_cargo_bin("transdoc"));
	cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
	cmd
}
