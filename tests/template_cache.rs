//! Scenario 5 from §8: exporter restart redefines a template id
//! and subsequent data decodes use the new shape, plus the snapshot/restore
//! round trip §6 promises.

use std::net::SocketAddr;
use std::time::SystemTime;

use netflow_decoder::{Decoder, DecoderBuilder, ExporterKey, FieldValue, TemplateEvent};

fn exporter() -> ExporterKey {
    let addr: SocketAddr = "198.51.100.5:2055".parse().unwrap();
    ExporterKey::new(addr, 3)
}

fn v9_header() -> Vec<u8> {
    let mut h = Vec::new();
    h.extend_from_slice(&9u16.to_be_bytes());
    h.extend_from_slice(&1u16.to_be_bytes());
    h.extend_from_slice(&0u32.to_be_bytes());
    h.extend_from_slice(&0u32.to_be_bytes());
    h.extend_from_slice(&1u32.to_be_bytes());
    h.extend_from_slice(&3u32.to_be_bytes());
    h
}

fn template_flowset(template_id: u16, fields: &[(u16, u16)]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&template_id.to_be_bytes());
    body.extend_from_slice(&(fields.len() as u16).to_be_bytes());
    for (id, len) in fields {
        body.extend_from_slice(&id.to_be_bytes());
        body.extend_from_slice(&len.to_be_bytes());
    }
    let mut flowset = Vec::new();
    flowset.extend_from_slice(&0u16.to_be_bytes());
    flowset.extend_from_slice(&((body.len() + 4) as u16).to_be_bytes());
    flowset.extend_from_slice(&body);
    flowset
}

fn data_flowset(template_id: u16, body: &[u8]) -> Vec<u8> {
    let mut flowset = Vec::new();
    flowset.extend_from_slice(&template_id.to_be_bytes());
    flowset.extend_from_slice(&((body.len() + 4) as u16).to_be_bytes());
    flowset.extend_from_slice(body);
    flowset
}

#[test]
fn exporter_restart_redefines_template_and_new_shape_wins() {
    let mut decoder = Decoder::default();

    let mut shape_x = v9_header();
    shape_x.extend_from_slice(&template_flowset(1024, &[(8, 4), (12, 4)]));
    decoder.decode(&shape_x, exporter(), SystemTime::now()).unwrap();

    let mut data_x = v9_header();
    data_x.extend_from_slice(&data_flowset(1024, &[10, 0, 0, 1, 10, 0, 0, 2]));
    let packet = decoder
        .decode(&data_x, exporter(), SystemTime::now())
        .unwrap()
        .unwrap();
    assert_eq!(
        packet.flows()[0].get("IPV4_SRC_ADDR"),
        Some(&FieldValue::Ipv4([10, 0, 0, 1].into()))
    );

    // Exporter restarts and redefines 1024 with a different shape.
    let mut shape_y = v9_header();
    shape_y.extend_from_slice(&template_flowset(1024, &[(7, 2), (11, 2)]));
    decoder.decode(&shape_y, exporter(), SystemTime::now()).unwrap();

    let mut data_y = v9_header();
    data_y.extend_from_slice(&data_flowset(1024, &[0, 80, 1, 187]));
    let packet = decoder
        .decode(&data_y, exporter(), SystemTime::now())
        .unwrap()
        .unwrap();

    assert!(packet.flows()[0].get("IPV4_SRC_ADDR").is_none());
    assert_eq!(packet.flows()[0].get("L4_SRC_PORT"), Some(&FieldValue::U16(80)));
    assert_eq!(packet.flows()[0].get("L4_DST_PORT"), Some(&FieldValue::U16(443)));
}

#[test]
fn collision_hook_fires_on_redefinition_not_on_first_learn() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let learned = Arc::new(AtomicUsize::new(0));
    let collided = Arc::new(AtomicUsize::new(0));
    let l = learned.clone();
    let c = collided.clone();

    let mut decoder = DecoderBuilder::default()
        .on_template_event(move |event| match event {
            TemplateEvent::Learned { .. } => {
                l.fetch_add(1, Ordering::SeqCst);
            }
            TemplateEvent::Collision { .. } => {
                c.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        })
        .build();

    let mut shape_x = v9_header();
    shape_x.extend_from_slice(&template_flowset(2048, &[(8, 4)]));
    decoder.decode(&shape_x, exporter(), SystemTime::now()).unwrap();
    assert_eq!(learned.load(Ordering::SeqCst), 1);
    assert_eq!(collided.load(Ordering::SeqCst), 0);

    let mut shape_y = v9_header();
    shape_y.extend_from_slice(&template_flowset(2048, &[(8, 4), (12, 4)]));
    decoder.decode(&shape_y, exporter(), SystemTime::now()).unwrap();
    assert_eq!(collided.load(Ordering::SeqCst), 1);
}

#[test]
fn snapshot_and_restore_preserve_decoding_across_a_fresh_decoder() {
    let mut decoder = Decoder::default();
    let mut shape = v9_header();
    shape.extend_from_slice(&template_flowset(4096, &[(8, 4)]));
    decoder.decode(&shape, exporter(), SystemTime::now()).unwrap();

    let bytes = decoder.snapshot_templates();
    let mut restored = DecoderBuilder::default().build_from_snapshot(&bytes).unwrap();

    let mut data = v9_header();
    data.extend_from_slice(&data_flowset(4096, &[192, 0, 2, 1]));
    let packet = restored
        .decode(&data, exporter(), SystemTime::now())
        .unwrap()
        .unwrap();

    assert_eq!(
        packet.flows()[0].get("IPV4_SRC_ADDR"),
        Some(&FieldValue::Ipv4([192, 0, 2, 1].into()))
    );
}
