mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use castrenderer::media_renderer;
use castupnp::{DeviceDescription, MEDIA_RENDERER_TYPE};
use common::Rig;
use tower::ServiceExt;

fn router(rig: &Rig) -> Router {
    let description = DeviceDescription {
        device_type: MEDIA_RENDERER_TYPE.to_string(),
        friendly_name: "castbridge \"Kitchen\" (test)".to_string(),
        manufacturer: "castbridge".to_string(),
        model_name: "castbridge".to_string(),
        model_description: "DLNA to Cast bridge".to_string(),
        model_number: "v1".to_string(),
        udn: "0f0e-0d0c".to_string(),
        services: Vec::new(),
    };
    Arc::new(media_renderer(description, Arc::new(rig.translator()))).router()
}

fn envelope(service: &str, action: &str, args: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
<s:Body><u:{action} xmlns:u="urn:schemas-upnp-org:service:{service}:1">{args}</u:{action}></s:Body>
</s:Envelope>"#
    )
}

async fn call(router: &Router, service: &str, action: &str, args: &str) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(
            Request::post(format!("/{}/control", service))
                .header("SOAPACTION", format!("\"urn:schemas-upnp-org:service:{}:1#{}\"", service, action))
                .body(Body::from(envelope(service, action, args)))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn get(router: &Router, path: &str) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn test_set_uri_then_media_info() {
    let rig = Rig::bound();
    let router = router(&rig);

    let (status, _) = call(
        &router,
        "AVTransport",
        "SetAVTransportURI",
        "<InstanceID>0</InstanceID><CurrentURI>http://nas/a/42.flac?x=1&amp;y=2</CurrentURI><CurrentURIMetaData></CurrentURIMetaData>",
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&router, "AVTransport", "GetMediaInfo", "<InstanceID>0</InstanceID>").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("GetMediaInfoResponse"));
    assert!(body.contains("<NrTracks>1</NrTracks>"));
    assert!(body.contains("<CurrentURI>http://nas/a/42.flac?x=1&amp;y=2</CurrentURI>"));

    let (_, body) = call(
        &router,
        "AVTransport",
        "GetCurrentTransportActions",
        "<InstanceID>0</InstanceID>",
    )
    .await;
    assert!(body.contains("<Actions>Play</Actions>"));
}

#[tokio::test]
async fn test_transport_info_after_play() {
    let mut rig = Rig::bound();
    let router = router(&rig);

    call(
        &router,
        "AVTransport",
        "SetAVTransportURI",
        "<InstanceID>0</InstanceID><CurrentURI>http://nas/a/42.flac</CurrentURI><CurrentURIMetaData/>",
    )
    .await;
    let (status, _) = call(
        &router,
        "AVTransport",
        "Play",
        "<InstanceID>0</InstanceID><Speed>1</Speed>",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    rig.step().unwrap();

    let (_, body) = call(&router, "AVTransport", "GetTransportInfo", "<InstanceID>0</InstanceID>").await;
    assert!(body.contains("<CurrentTransportState>PLAYING</CurrentTransportState>"));
    assert!(body.contains("<CurrentTransportStatus>OK</CurrentTransportStatus>"));
    assert!(body.contains("<CurrentSpeed>1</CurrentSpeed>"));
}

#[tokio::test]
async fn test_faults() {
    let rig = Rig::bound();
    let router = router(&rig);

    let (status, body) = call(&router, "AVTransport", "Stop", "<InstanceID>1</InstanceID>").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("<errorCode>718</errorCode>"));

    let (_, body) = call(
        &router,
        "AVTransport",
        "Seek",
        "<InstanceID>0</InstanceID><Unit>TRACK_NR</Unit><Target>2</Target>",
    )
    .await;
    assert!(body.contains("<errorCode>402</errorCode>"));

    let (_, body) = call(
        &router,
        "AVTransport",
        "Seek",
        "<InstanceID>0</InstanceID><Unit>REL_TIME</Unit><Target>later</Target>",
    )
    .await;
    assert!(body.contains("<errorCode>711</errorCode>"));

    let (_, body) = call(
        &router,
        "AVTransport",
        "SetAVTransportURI",
        "<InstanceID>0</InstanceID><CurrentURI>file:///etc/passwd</CurrentURI>",
    )
    .await;
    assert!(body.contains("<errorCode>402</errorCode>"));

    let (_, body) = call(&router, "AVTransport", "Eject", "<InstanceID>0</InstanceID>").await;
    assert!(body.contains("<errorCode>401</errorCode>"));

    let (_, body) = call(&router, "AVTransport", "Play", "<InstanceID>0</InstanceID>").await;
    assert!(body.contains("<errorCode>501</errorCode>"));
}

#[tokio::test]
async fn test_rendering_control_reports_fixed_volume() {
    let rig = Rig::bound();
    let router = router(&rig);

    let (_, body) = call(
        &router,
        "RenderingControl",
        "GetVolume",
        "<InstanceID>0</InstanceID><Channel>Master</Channel>",
    )
    .await;
    assert!(body.contains("<CurrentVolume>100</CurrentVolume>"));

    let (status, _) = call(
        &router,
        "RenderingControl",
        "SetVolume",
        "<InstanceID>0</InstanceID><Channel>Master</Channel><DesiredVolume>20</DesiredVolume>",
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(
        &router,
        "RenderingControl",
        "GetVolume",
        "<InstanceID>0</InstanceID><Channel>Master</Channel>",
    )
    .await;
    assert!(body.contains("<CurrentVolume>100</CurrentVolume>"));
}

#[tokio::test]
async fn test_connection_manager_protocol_info() {
    let rig = Rig::unbound();
    let router = router(&rig);

    let (status, body) = call(&router, "ConnectionManager", "GetProtocolInfo", "").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<Sink>http-get:*:audio/*:*,http-get:*:video/*:*</Sink>"));

    let (_, body) = call(&router, "ConnectionManager", "GetCurrentConnectionIDs", "").await;
    assert!(body.contains("<ConnectionIDs>0</ConnectionIDs>"));
}

#[tokio::test]
async fn test_descriptions_are_served() {
    let rig = Rig::unbound();
    let router = router(&rig);

    let (status, body) = get(&router, "/device.xml").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("urn:schemas-upnp-org:device:MediaRenderer:1"));
    assert!(body.contains("<UDN>uuid:0f0e-0d0c</UDN>"));
    for service in ["AVTransport", "RenderingControl", "ConnectionManager"] {
        assert!(body.contains(&format!("urn:schemas-upnp-org:service:{}:1", service)));
    }

    let (status, body) = get(&router, "/AVTransport/desc.xml").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<name>SetAVTransportURI</name>"));
    assert!(body.contains("<name>LastChange</name>"));
}
