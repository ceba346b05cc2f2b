//! End-to-end dispatch tests for the interactive run commands.
//!
//! Each test stands up a throwaway working directory with stub shell
//! scripts in place of the compiled binary and the toolchain, then
//! checks the streamed output and the files left behind.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use lexbench::config::ToolchainConfig;
use lexbench::harness::Dispatcher;
use lexbench::sink::CaptureSink;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn run_binary_keeps_only_unscripted_transcript_lines() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "a.out",
        "#!/bin/sh\necho ready\nwhile read line; do echo \"=> $line\"; done\n",
    );
    let mut dispatcher = Dispatcher::new(ToolchainConfig::default(), dir.path());
    let sink = CaptureSink::new();

    dispatcher.execute("/* a.out */\nfirst\nsecond", &sink).await;

    // Echoed input lines are consumed by the script; the banner, the
    // replies, and the trailing empty line survive.
    assert_eq!(sink.stdout(), "ready\n=> first\n=> second\n");
    assert_eq!(sink.stderr(), "");
}

#[tokio::test]
async fn silent_consumer_yields_empty_payload() {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "a.out", "#!/bin/sh\nwhile read line; do :; done\n");
    let mut dispatcher = Dispatcher::new(ToolchainConfig::default(), dir.path());
    let sink = CaptureSink::new();

    dispatcher.execute("/* a.out */\nfirst\nsecond", &sink).await;

    assert_eq!(sink.stdout(), "");
    assert_eq!(sink.stderr(), "");
    // The payload is still written, it just happens to be empty.
    let wrote_empty_stdout = sink
        .chunks()
        .iter()
        .any(|(source, text)| *source == lexbench::sink::StreamSource::Stdout && text.is_empty());
    assert!(wrote_empty_stdout);
}

#[tokio::test]
async fn interactive_exit_code_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "a.out",
        "#!/bin/sh\nread line\necho \"got $line\"\nexit 9\n",
    );
    let mut dispatcher = Dispatcher::new(ToolchainConfig::default(), dir.path());
    let sink = CaptureSink::new();

    let reply = dispatcher.execute("/* a.out */\nping", &sink).await;

    assert_eq!(reply.execution_count, 1);
    assert_eq!(sink.stdout(), "got ping\n");
    assert_eq!(sink.stderr(), "");
}

#[tokio::test]
async fn custom_run_builds_listing_and_compiles_it() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "a.out",
        "#!/bin/sh\nwhile read line; do echo \"ASM $line\"; done\n",
    );
    let asm = write_script(
        dir.path(),
        "fakecc",
        "#!/bin/sh\necho \"$@\" > cc_args.txt\nexit 0\n",
    );
    let config = ToolchainConfig {
        asm_program: asm.display().to_string(),
        ..Default::default()
    };
    let mut dispatcher = Dispatcher::new(config, dir.path());
    let sink = CaptureSink::new();

    dispatcher
        .execute("/* uecc prog.ue */\npush 1\npush 2", &sink)
        .await;

    assert_eq!(
        sink.stdout(),
        "ASM push 1\nASM push 2\n[UECC] cc generates a.out successfully\n"
    );
    assert_eq!(sink.stderr(), "");

    // The binary was copied before anything ran, the source was written,
    // and the transcript diff became the listing fed to the compiler.
    assert!(dir.path().join("uecc").exists());
    assert_eq!(
        fs::read_to_string(dir.path().join("prog.ue")).unwrap(),
        "push 1\npush 2\n"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("prog.ue.s")).unwrap(),
        "ASM push 1\nASM push 2\n"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("cc_args.txt")).unwrap(),
        "-no-pie -z execstack prog.ue.s\n"
    );
    assert_eq!(
        dispatcher.created_files(),
        &[
            dir.path().join("uecc"),
            dir.path().join("prog.ue"),
            dir.path().join("prog.ue.s"),
        ]
    );
}

#[tokio::test]
async fn custom_run_reports_failing_assembler() {
    let dir = tempfile::tempdir().unwrap();
    write_script(
        dir.path(),
        "a.out",
        "#!/bin/sh\nwhile read line; do echo \"ASM $line\"; done\n",
    );
    let asm = write_script(dir.path(), "fakecc", "#!/bin/sh\nexit 3\n");
    let config = ToolchainConfig {
        asm_program: asm.display().to_string(),
        ..Default::default()
    };
    let mut dispatcher = Dispatcher::new(config, dir.path());
    let sink = CaptureSink::new();

    dispatcher.execute("/* uecc prog.ue */\nhalt", &sink).await;

    assert_eq!(sink.stdout(), "ASM halt\n");
    assert_eq!(sink.stderr(), "[UECC] cc exited with code 3\n");
    // The compile step ran against the listing even though it failed.
    assert!(dir.path().join("prog.ue.s").exists());
}
