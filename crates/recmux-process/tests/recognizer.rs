use std::time::{Duration, Instant};

use recmux_frame::{Message, MessageType, Mux};
use recmux_process::{ProcessConfig, ProcessError, RecognizerProcess};

/// Drive the recognizer's queues until `count` messages arrived or EOF.
fn collect(process: &mut RecognizerProcess, count: usize) -> Vec<Message> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut received = Vec::new();
    while received.len() < count && Instant::now() < deadline {
        let (inq, outq) = process.queues_mut();
        Mux::new()
            .add_in_queue(inq)
            .add_out_queue(outq)
            .wait_and_flush_timeout(Duration::from_millis(100))
            .unwrap();
        received.extend(process.in_queue_mut().drain());
        if process.in_queue().eof() {
            break;
        }
    }
    received
}

#[test]
fn start_sends_beam_then_lm_scale() {
    let mut process = RecognizerProcess::new("", "cat", 15, 30).unwrap();
    process.start().unwrap();

    let pending: Vec<_> = process
        .out_queue()
        .pending()
        .map(|m| (m.message_type(), m.urgent(), m.data_as_string().into_owned()))
        .collect();
    assert_eq!(
        pending,
        vec![
            (Some(MessageType::DecoderSetting), true, "beam 15".to_string()),
            (Some(MessageType::DecoderSetting), true, "lm_scale 30".to_string()),
        ]
    );

    process.finish().unwrap();
}

#[test]
fn messages_round_trip_through_cat() {
    let mut process = RecognizerProcess::new("", "cat", 15, 30).unwrap();
    process.start().unwrap();

    let handshake = collect(&mut process, 2);
    let payloads: Vec<_> = handshake
        .iter()
        .map(|m| m.data_as_string().into_owned())
        .collect();
    assert_eq!(payloads, vec!["beam 15", "lm_scale 30"]);

    let mut msg = Message::new(MessageType::Recog, false);
    msg.append("hello world");
    msg.append_u32(7);
    process.send(msg.clone()).unwrap();

    let echoed = collect(&mut process, 1);
    assert_eq!(echoed, vec![msg]);

    let status = process.finish().unwrap().unwrap();
    assert!(status.success());
}

#[test]
fn connect_prefix_is_part_of_the_command() {
    let mut process = RecognizerProcess::new("sh -c", "'exec cat'", 20, 40).unwrap();
    process.start().unwrap();

    let echoed = collect(&mut process, 2);
    assert_eq!(echoed.len(), 2);
    assert_eq!(echoed[0].data_as_string(), "beam 20");

    process.finish().unwrap();
}

#[test]
fn recognizer_exit_sets_eof() {
    let mut process = RecognizerProcess::new("", "sh -c 'exec 0<&-; exit 0'", 15, 30).unwrap();
    process.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while !process.in_queue().eof() && Instant::now() < deadline {
        let (inq, _) = process.queues_mut();
        Mux::new()
            .add_in_queue(inq)
            .wait_and_flush_timeout(Duration::from_millis(100))
            .unwrap();
    }
    assert!(process.in_queue().eof());
    assert!(process.in_queue().is_empty());
    process.finish().unwrap();
}

#[test]
fn missing_program_is_an_exec_error() {
    let mut process = RecognizerProcess::new("", "/nonexistent/recognizer --fast", 15, 30).unwrap();
    match process.start().unwrap_err() {
        ProcessError::Exec { program, .. } => assert_eq!(program, "/nonexistent/recognizer"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!process.is_running());
}

#[test]
fn broken_pipe_finishes_the_process() {
    let mut process = RecognizerProcess::new("", "true", 15, 30).unwrap();
    process.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while process.try_wait().unwrap().is_none() {
        assert!(Instant::now() < deadline, "child did not exit");
        std::thread::sleep(Duration::from_millis(10));
    }

    let err = process.apply_settings(100, 50).unwrap_err();
    assert!(err.is_broken_pipe());
    assert!(!process.is_running());
    assert!(!process.out_queue().is_enabled());
    assert_eq!(process.get_beam(), 100);
    assert_eq!(process.get_lmscale(), 50);
}

#[test]
fn stubborn_recognizer_is_killed() {
    let config = ProcessConfig {
        shutdown_grace: Duration::from_millis(100),
        ..ProcessConfig::default()
    };
    let mut process = RecognizerProcess::with_config(
        "",
        "sh -c \"trap '' TERM; while :; do sleep 1; done\"",
        15,
        30,
        config,
    )
    .unwrap();
    process.start().unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    let status = process.finish().unwrap().unwrap();
    assert!(!status.success());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn drop_reaps_the_child() {
    let pid = {
        let mut process = RecognizerProcess::new("", "cat", 15, 30).unwrap();
        process.start().unwrap();
        process.pid().unwrap()
    };
    // SAFETY: signal 0 only probes for existence.
    let alive = unsafe { libc::kill(pid, 0) } == 0;
    assert!(!alive);
}
