// tests/containers.rs

use std::collections::BTreeMap;

use jobdag::job::{ExecutableContainer, ExecutableInitializer};
use jobdag::types::{JobId, TaskId};
use jobdag_test_utils::init_tracing;

fn init_for(name: &str, attempt: u32) -> ExecutableInitializer {
    ExecutableInitializer {
        task: TaskId::new(JobId(1), 0, name),
        attempt,
    }
}

#[test]
fn test_native_container_launches_its_command_line_unchanged() {
    init_tracing();
    let container = ExecutableContainer::Native {
        command_line: vec!["/bin/tar".to_string(), "-czf".to_string(), "out.tgz".to_string()],
    };
    assert_eq!(container.kind(), "native");

    let executable = container.create_executable(&init_for("pack", 0));
    assert_eq!(executable.command, vec!["/bin/tar", "-czf", "out.tgz"]);
    assert_eq!(executable.attempt, 0);
    assert_eq!(executable.task.readable_name(), "pack");
}

#[test]
fn test_forked_java_container_assembles_the_jvm_invocation() {
    init_tracing();
    let mut args = BTreeMap::new();
    args.insert("input".to_string(), "/data/in".to_string());
    let container = ExecutableContainer::ForkedJava {
        class_name: "org.example.Crunch".to_string(),
        serialized_args: args,
        java_home: Some("/opt/jdk".to_string()),
        jvm_args: vec!["-Xmx2g".to_string()],
    };
    assert_eq!(container.kind(), "forked_java");

    let executable = container.create_executable(&init_for("crunch", 2));
    assert_eq!(
        executable.command,
        vec!["/opt/jdk/bin/java", "-Xmx2g", "org.example.Crunch", "input=/data/in"]
    );
    assert_eq!(executable.attempt, 2);
}

#[test]
fn test_script_container_hands_engine_and_code_to_the_executor() {
    init_tracing();
    let container = ExecutableContainer::Script {
        engine: "groovy".to_string(),
        code: "println 'ok'".to_string(),
    };
    assert_eq!(container.kind(), "script");

    let executable = container.create_executable(&init_for("inline", 0));
    assert_eq!(executable.command, vec!["groovy", "println 'ok'"]);
}
