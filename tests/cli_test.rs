use assert_cmd::Command; // Run programs
use predicates::prelude::*;
use tempfile;
type DYNERR = Box<dyn std::error::Error>;

fn run_file(source: &str,stdin: &str,extra: &[&str]) -> Result<assert_cmd::assert::Assert,DYNERR> {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("program.bf");
    std::fs::write(&path,source)?;
    let mut cmd = Command::cargo_bin("bfjit")?;
    for arg in extra {
        cmd.arg(arg);
    }
    Ok(cmd.arg(&path).write_stdin(stdin).assert())
}

#[test]
fn empty_program_runs_silently() -> Result<(),DYNERR> {
    run_file("","",&[])?.success().stdout("");
    Ok(())
}

#[test]
fn prints_a_raw_byte() -> Result<(),DYNERR> {
    run_file("+++.","",&[])?.success().stdout(vec![3u8]);
    Ok(())
}

#[test]
fn prints_capital_a() -> Result<(),DYNERR> {
    run_file("++++++++[>++++++++<-]>+.","",&[])?.success().stdout("A");
    Ok(())
}

#[test]
fn zeroing_loop_terminates() -> Result<(),DYNERR> {
    run_file("[-]","",&[])?.success().stdout("");
    Ok(())
}

#[test]
fn nested_empty_loops_terminate() -> Result<(),DYNERR> {
    run_file("[[[]]]","",&[])?.success().stdout("");
    Ok(())
}

#[test]
fn echoes_input_bytes() -> Result<(),DYNERR> {
    run_file(",.,.","hi",&[])?.success().stdout("hi");
    Ok(())
}

#[test]
fn source_can_come_from_stdin() -> Result<(),DYNERR> {
    let mut cmd = Command::cargo_bin("bfjit")?;
    cmd.write_stdin("+++.").assert().success().stdout(vec![3u8]);
    Ok(())
}

#[test]
fn unterminated_loop_fails_with_a_diagnostic() -> Result<(),DYNERR> {
    run_file("[","",&[])?
        .failure()
        .stderr(predicate::str::is_empty().not());
    Ok(())
}

#[test]
fn dump_code_shows_the_empty_image() -> Result<(),DYNERR> {
    run_file("","",&["--dump-code"])?
        .success()
        .stdout(predicate::str::contains("554889e5534889fb5b5dc3"));
    Ok(())
}

#[test]
fn dump_ir_respects_no_opt() -> Result<(),DYNERR> {
    let optimized = run_file("++","",&["--dump-ir"])?.success();
    let text = String::from_utf8_lossy(&optimized.get_output().stdout).to_string();
    assert_eq!(text.matches("Incr").count(),1);

    let raw = run_file("++","",&["--dump-ir","--no-opt"])?.success();
    let text = String::from_utf8_lossy(&raw.get_output().stdout).to_string();
    assert_eq!(text.matches("Incr").count(),2);
    Ok(())
}
