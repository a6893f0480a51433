use std::net::UdpSocket;
use std::time::SystemTime;

use netflow_decoder::{Decoder, ExporterKey};

fn main() {
    let socket = UdpSocket::bind("127.0.0.1:9995").expect("couldn't bind to address");
    let mut buf = [0u8; 65_535];

    // Using default configuration. For custom configuration, use the builder pattern:
    //
    // let mut decoder = Decoder::builder()
    //     .with_cache_size(2000)
    //     .with_max_deferred_datagrams(1000)
    //     .build();
    let mut decoder = Decoder::default();

    loop {
        let (number_of_bytes, src_addr) =
            socket.recv_from(&mut buf).expect("didn't receive data");
        let filled_buf = &buf[..number_of_bytes];
        let exporter = ExporterKey::new(src_addr, 0);

        match decoder.decode(filled_buf, exporter, SystemTime::now()) {
            Ok(Some(packet)) => println!("{:?}", packet),
            Ok(None) => {
                // A v9/IPFIX data set referenced a template this exporter
                // hasn't sent yet; the datagram is queued.
            }
            Err(err) => eprintln!("dropped datagram from {src_addr}: {err}"),
        }

        // Templates just learned above may unblock datagrams queued from
        // earlier in the stream.
        for resolved in decoder.drain_resolved() {
            println!("{:?}", resolved.packet);
        }
    }
}
