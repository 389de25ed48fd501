use std::fs::OpenOptions;
use std::io::{BufReader, BufWriter, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ems::config::EmsConfig;
use ems::context::EmsContext;
use ems::server::wire;
use ems::server::SessionServer;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;

fn fifo_path(dir: &tempfile::TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

/// Drives one full connect → create → reserve → show → quit exchange
/// against a real `SessionServer` over real named pipes.
#[test]
fn connect_create_reserve_show_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let server_pipe = fifo_path(&dir, "server.fifo");
    let request_pipe = fifo_path(&dir, "req.fifo");
    let response_pipe = fifo_path(&dir, "resp.fifo");

    mkfifo(request_pipe.as_str(), Mode::from_bits_truncate(0o600)).unwrap();
    mkfifo(response_pipe.as_str(), Mode::from_bits_truncate(0o600)).unwrap();

    let ctx = EmsContext::new(EmsConfig::for_server(Duration::ZERO));
    ctx.store.initialize(Duration::ZERO).unwrap();
    let server = Arc::new(SessionServer::new(ctx));

    let server_for_thread = server.clone();
    let server_pipe_for_thread = server_pipe.clone();
    let server_handle = thread::spawn(move || {
        server_for_thread.run(&server_pipe_for_thread).unwrap();
    });

    // Give the accept loop a moment to create the FIFO before connecting.
    thread::sleep(Duration::from_millis(100));

    let request_pipe_for_server = request_pipe.clone();
    let response_pipe_for_server = response_pipe.clone();
    let server_pipe_for_connect = server_pipe.clone();
    let connect_handle = thread::spawn(move || {
        let mut connect_writer =
            OpenOptions::new().write(true).open(&server_pipe_for_connect).expect("open server fifo for write");
        wire::write_u8(&mut connect_writer, b'1').unwrap();
        wire::write_pipe_name(&mut connect_writer, &request_pipe_for_server).unwrap();
        wire::write_pipe_name(&mut connect_writer, &response_pipe_for_server).unwrap();
        drop(connect_writer);

        let mut ack_reader = BufReader::new(OpenOptions::new().read(true).open(&server_pipe_for_connect).unwrap());
        wire::read_usize(&mut ack_reader).expect("slot ack")
    });

    let req_writer = OpenOptions::new().write(true).open(&request_pipe).expect("open request fifo");
    let resp_reader = OpenOptions::new().read(true).open(&response_pipe).expect("open response fifo");
    let mut req = BufWriter::new(req_writer);
    let mut resp = BufReader::new(resp_reader);

    let slot = connect_handle.join().unwrap();
    assert!(slot < ems::server::MAX_SESSIONS);

    wire::write_u8(&mut req, b'3').unwrap(); // create
    wire::write_u32(&mut req, 1).unwrap();
    wire::write_usize(&mut req, 2).unwrap();
    wire::write_usize(&mut req, 2).unwrap();
    req.flush().unwrap();
    assert_eq!(wire::read_u8(&mut resp).unwrap(), 0);

    wire::write_u8(&mut req, b'4').unwrap(); // reserve
    wire::write_u32(&mut req, 1).unwrap();
    wire::write_usize(&mut req, 2).unwrap();
    wire::write_usize(&mut req, 1).unwrap();
    wire::write_usize(&mut req, 1).unwrap();
    wire::write_usize(&mut req, 1).unwrap();
    wire::write_usize(&mut req, 2).unwrap();
    req.flush().unwrap();
    assert_eq!(wire::read_u8(&mut resp).unwrap(), 0);

    wire::write_u8(&mut req, b'5').unwrap(); // show
    wire::write_u32(&mut req, 1).unwrap();
    req.flush().unwrap();
    assert_eq!(wire::read_u8(&mut resp).unwrap(), 0);
    let rows = wire::read_usize(&mut resp).unwrap();
    let cols = wire::read_usize(&mut resp).unwrap();
    assert_eq!((rows, cols), (2, 2));
    let cells: Vec<u32> = (0..rows * cols).map(|_| wire::read_u32(&mut resp).unwrap()).collect();
    assert_eq!(cells, vec![1, 1, 0, 0]);

    wire::write_u8(&mut req, b'2').unwrap(); // quit
    req.flush().unwrap();

    server.shutdown();
    server_handle.join().unwrap();
}
