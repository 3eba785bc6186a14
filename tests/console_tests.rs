//! Integration tests for console devices and the device registry

use consolebench::registry::DeviceRegistry;
use consolebench::session::ScriptedTransport;
use consolebench::{
    ConsoleBuilder, ConsoleDevice, Error, ExpectError, Inventory, Pattern, RegistryError,
};
use std::time::Duration;

fn shell(script: ScriptedTransport) -> ConsoleDevice {
    ConsoleBuilder::new("lan")
        .prompt(Pattern::regex(r"\$ $").expect("Invalid regex"))
        .with_transport(script.echo(true))
}

#[test]
fn test_command_output_between_echo_and_prompt() {
    let mut dut = ConsoleBuilder::new("dut")
        .prompt(Pattern::exact("prompt>"))
        .with_transport(ScriptedTransport::new().on_line("echo FOO", "echo FOO\r\nFOO\r\nprompt>"));

    assert_eq!(dut.run_command("echo FOO", None).unwrap(), "FOO");
}

#[test]
fn test_echo_command_output() {
    let mut lan = shell(ScriptedTransport::new().on_line("echo FOO", "FOO\r\n$ "));

    let out = lan
        .run_command("echo FOO", Some(Duration::from_secs(2)))
        .expect("Command failed");

    assert_eq!(out, "FOO");
}

#[test]
fn test_run_command_is_repeatable() {
    let mut lan = shell(
        ScriptedTransport::new().on_line("cat /etc/hostname", "bench-lan-1\r\n$ "),
    );

    let first = lan.run_command("cat /etc/hostname", None).unwrap();
    let second = lan.run_command("cat /etc/hostname", None).unwrap();

    assert_eq!(first, "bench-lan-1");
    assert_eq!(first, second);
}

#[test]
fn test_timeout_interrupts_and_keeps_partial_output() {
    let script = ScriptedTransport::new()
        .on_line("ping 10.0.0.9", "PING 10.0.0.9 56 data bytes\r\n")
        .on_control(0x03, "^C\r\n$ ")
        .on_line("echo ok", "ok\r\n$ ");
    let handle = script.handle();
    let mut lan = shell(script);

    let err = lan
        .run_command("ping 10.0.0.9", Some(Duration::from_millis(150)))
        .unwrap_err();

    match err {
        ExpectError::CommandTimeout {
            command, partial, ..
        } => {
            assert_eq!(command, "ping 10.0.0.9");
            assert!(partial.contains("PING 10.0.0.9"));
        }
        other => panic!("expected CommandTimeout, got {other:?}"),
    }
    assert!(handle.written_bytes().contains(&0x03));

    // Stale "^C" output is skipped by the next command's echo match.
    assert_eq!(lan.run_command("echo ok", None).unwrap(), "ok");
}

#[test]
fn test_prompt_swap_for_config_mode() {
    let mut router = ConsoleBuilder::new("wan")
        .prompt(Pattern::exact("router#"))
        .with_transport(
            ScriptedTransport::new()
                .echo(true)
                .on_line("configure terminal", "\r\nrouter(config)#")
                .on_line("hostname lab", "\r\nlab(config)#")
                .on_line("end", "\r\nlab#"),
        );

    let err = router
        .run_command("configure terminal", Some(Duration::from_millis(100)))
        .unwrap_err();
    assert!(matches!(err, ExpectError::CommandTimeout { .. }));

    router.set_prompts(vec![Pattern::regex(r"[\w-]+\(config[^)]*\)#").unwrap()]);
    assert_eq!(router.run_command("hostname lab", None).unwrap(), "");

    router.set_prompts(vec![Pattern::glob("*#")]);
    router.push_prompt(Pattern::exact("lab#"));
    assert_eq!(router.prompts().len(), 2);
    router.run_command("end", None).unwrap();
}

#[test]
fn test_closed_channel_is_end_of_stream() {
    let script = ScriptedTransport::new()
        .on_line("reboot", "Rebooting...\r\n")
        .close_when_drained();
    let mut cm = shell(script);

    let err = cm.run_command("reboot", Some(Duration::from_secs(2))).unwrap_err();
    assert!(matches!(err, ExpectError::EndOfStream));

    let m = cm
        .expect_any(&[Pattern::exact("login:"), Pattern::Eof], None)
        .unwrap();
    assert_eq!(m.pattern_index, 1);
}

const BENCH: &str = r#"
[run]
default_timeout = 2

[[device]]
name = "lan"
role = "client"
features = ["dhcp-client"]
transport = "local"
prompts = ['\$ $']

[[device]]
name = "wan"
role = "router"
location = "rack-3"
transport = "telnet"
params = { host = "10.0.0.1", port = 2003 }
prompts = ['router#']
"#;

fn wired_bench() -> DeviceRegistry {
    let inventory = Inventory::from_toml_str(BENCH).expect("Invalid inventory");
    DeviceRegistry::from_inventory_with(&inventory, |builder| {
        let script = ScriptedTransport::new()
            .echo(true)
            .on_line("ip -br addr", "eth1 UP 192.168.1.20/24\r\n$ ")
            .on_line("show clock", "12:00:00 UTC\r\nrouter#");
        Ok(builder.with_transport(script))
    })
    .expect("Failed to wire bench")
}

#[test]
fn test_registry_lookups_share_one_device() {
    let bench = wired_bench();

    let by_role = bench.by_role("client");
    let by_name = bench.accessor("lan");
    let by_feature = bench.by_feature("dhcp-client");
    assert!(by_role.same_device(&by_name));
    assert!(by_role.same_device(&by_feature));
    assert!(bench.by_location("rack-3").same_device(&bench.accessor("wan")));

    let out = by_role.run_command("ip -br addr", None).unwrap();
    assert!(out.contains("192.168.1.20"));
    assert_eq!(bench.accessor("wan").run_command("show clock", None).unwrap(), "12:00:00 UTC");
}

#[test]
fn test_registry_missing_device_fails_on_use() {
    let bench = wired_bench();
    let ghost = bench.by_role("provisioner");

    assert!(!ghost.is_available());
    let err = ghost.run_command("true", None).unwrap_err();
    assert!(matches!(
        err,
        Error::Registry(RegistryError::DeviceDoesNotExist { .. })
    ));
}

#[test]
fn test_registry_nested_use_is_busy() {
    let bench = wired_bench();
    let outer = bench.accessor("lan");
    let inner = bench.by_role("client");

    let nested = outer.with(|_| inner.run_command("ip -br addr", None)).unwrap();
    assert!(matches!(
        nested,
        Err(Error::Registry(RegistryError::DeviceBusy { .. }))
    ));
}
