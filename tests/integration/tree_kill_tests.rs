//! Process-tree termination must reach grandchildren, not just the child.
#![cfg(unix)]

use std::time::Duration;

use inspect_gate::process::{platform_tree_killer, ProcessRunner, RunSpec};

use super::test_helpers::{process_gone, wait_gone, wait_until};

const FORK_THREE: &str = "for i in 1 2 3; do sleep 30 & echo $!; done; wait";

fn child_pids(output: &str) -> Vec<i32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

async fn spawn_tree() -> (inspect_gate::process::ManagedProcess, Vec<i32>) {
    let spec = RunSpec::new("sh", std::env::temp_dir()).args(["-c", FORK_THREE]);
    let process = ProcessRunner::new().run(&spec, Vec::new(), None).unwrap();
    wait_until(|| child_pids(&process.output()).len() == 3).await;
    let pids = child_pids(&process.output());
    (process, pids)
}

#[tokio::test]
async fn terminate_kills_every_descendant() {
    let (process, pids) = spawn_tree().await;
    for pid in &pids {
        assert!(!process_gone(*pid), "grandchild {pid} should be running");
    }

    tokio::time::timeout(Duration::from_secs(10), process.terminate())
        .await
        .unwrap();

    for pid in pids {
        assert!(wait_gone(pid).await, "grandchild {pid} survived");
    }
}

#[tokio::test]
async fn drop_kills_every_descendant() {
    let (process, pids) = spawn_tree().await;
    let leader = i32::try_from(process.pid()).unwrap();

    drop(process);

    assert!(wait_gone(leader).await);
    for pid in pids {
        assert!(wait_gone(pid).await, "grandchild {pid} survived");
    }
}

#[tokio::test]
async fn killing_a_dead_tree_is_ok() {
    let spec = RunSpec::new("sh", std::env::temp_dir()).args(["-c", "exit 0"]);
    let process = ProcessRunner::new().run(&spec, Vec::new(), None).unwrap();
    process.wait().await;

    platform_tree_killer()
        .terminate_tree(process.pid())
        .unwrap();
}

const LEAVE_ORPHAN: &str = "sleep 30 & echo $!; exit 0";

async fn spawn_exited_leader() -> (inspect_gate::process::ManagedProcess, i32) {
    let spec = RunSpec::new("sh", std::env::temp_dir()).args(["-c", LEAVE_ORPHAN]);
    let process = ProcessRunner::new().run(&spec, Vec::new(), None).unwrap();
    wait_until(|| child_pids(&process.output()).len() == 1).await;
    let orphan = child_pids(&process.output())[0];
    tokio::time::timeout(Duration::from_secs(10), process.wait())
        .await
        .unwrap();
    assert!(!process.is_alive());
    assert!(!process_gone(orphan), "orphan {orphan} should outlive its leader");
    (process, orphan)
}

#[tokio::test]
async fn terminate_after_leader_exit_kills_orphans() {
    let (process, orphan) = spawn_exited_leader().await;

    tokio::time::timeout(Duration::from_secs(10), process.terminate())
        .await
        .unwrap();

    assert!(wait_gone(orphan).await, "orphan {orphan} survived");
}

#[tokio::test]
async fn drop_after_leader_exit_kills_orphans() {
    let (process, orphan) = spawn_exited_leader().await;

    drop(process);

    assert!(wait_gone(orphan).await, "orphan {orphan} survived");
}
