use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use xorkad::transport::UdpTransport;
use xorkad::{Bytes, Config, Id, Message, MessageKind, Node};

#[test]
fn set_and_get_over_loopback() {
    let transport = Arc::new(UdpTransport::default());

    let nodes: Vec<Node> = (0..5).map(|_| Node::new(Config::default())).collect();

    for (i, node) in nodes.iter().enumerate() {
        node.connect(transport.clone()).unwrap();

        if i > 0 {
            let seed = &nodes[i - 1];
            node.bootstrap(*seed.id(), seed.address().unwrap()).unwrap();
        }
    }

    nodes[4].set("1:name", "Andrew the 1th").unwrap();

    assert_eq!(
        nodes[0].get("1:name"),
        Some(Bytes::from_static(b"Andrew the 1th"))
    );
}

#[test]
fn separate_transports() {
    let a = Node::new(Config::default());
    let b = Node::new(Config::default());

    a.connect(Arc::new(UdpTransport::default())).unwrap();
    b.connect(Arc::new(UdpTransport::default())).unwrap();

    assert!(b.ping(a.contact().unwrap()));
    assert!(a.routing_table().has(&b.contact().unwrap()));
}

#[test]
fn unrecognized_kind_is_dropped_without_reply() {
    let node = Node::new(Config::default());
    let address = node.connect(Arc::new(UdpTransport::default())).unwrap();

    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_millis(300)))
        .unwrap();

    let mut datagram = b"d1:ci7e1:o20:".to_vec();
    datagram.extend_from_slice(Id::random().as_bytes());
    datagram.extend_from_slice(b"1:y7:unknowne");
    socket.send_to(&datagram, address).unwrap();

    let mut buf = [0u8; 2048];
    assert!(socket.recv_from(&mut buf).is_err(), "nothing is sent back");

    let ping = Message::request(Id::random(), MessageKind::Ping);
    socket.send_to(&ping.to_bytes().unwrap(), address).unwrap();

    let (amt, from) = socket.recv_from(&mut buf).unwrap();
    let reply = Message::from_bytes(&buf[..amt]).unwrap();

    assert_eq!(from, address);
    assert_eq!(reply.cookie, ping.cookie);
    assert_eq!(reply.kind, MessageKind::PingReply);
    assert_eq!(reply.sender_id, *node.id());
}
