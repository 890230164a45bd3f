//! http surface of the piece store proxy:
//! `GET /<cid>` streams a local copy or redirects to the market,
//! `PUT /<cid>` stores the request body into a local store.

use std::io::{self, Read};
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use forest_cid::Cid;
use futures::TryStreamExt;
use tokio::sync::mpsc;
use tokio_util::io::{StreamReader, SyncIoBridge};

use super::PieceStoreProxy;
use crate::errors::{kind, ErrorKind};
use crate::logging::{debug, error, warn};
use crate::metrics::{RESULT_MISS, RESULT_OK, VIEW};

const CHUNK_SIZE: usize = 1 << 20;

pub fn router(proxy: Arc<PieceStoreProxy>) -> Router {
    Router::new()
        .route("/:cid", get(get_piece).put(put_piece))
        .with_state(proxy)
}

fn parse_cid(raw: &str) -> Result<Cid, Response> {
    Cid::from_str(raw).map_err(|e| {
        warn!(cid = raw, "decode piece cid: {:?}", e);
        (StatusCode::BAD_REQUEST, format!("decode piece cid: {:?}", e)).into_response()
    })
}

/// pumps the blocking reader through a bounded channel
fn reader_body(mut r: Box<dyn Read + Send>) -> Body {
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(4);

    tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let chunk = match r.read(&mut buf) {
                Ok(0) => return,
                Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => Err(e),
            };

            let failed = chunk.is_err();
            // receiver gone, client disconnected
            if tx.blocking_send(chunk).is_err() || failed {
                return;
            }
        }
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    Body::from_stream(stream)
}

async fn get_piece(State(proxy): State<Arc<PieceStoreProxy>>, Path(raw): Path<String>) -> Response {
    let c = match parse_cid(&raw) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let lookup = proxy.clone();
    let found = match tokio::task::spawn_blocking(move || lookup.find_local(&c)).await {
        Ok(found) => found,
        Err(e) => {
            error!(piece = %c, "lookup local piece: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    match found {
        Some((instance, r)) => {
            VIEW.piece_store.get(RESULT_OK);
            debug!(piece = %c, instance = instance.as_str(), "serve local piece");
            (
                [(header::CONTENT_TYPE, "application/octet-stream")],
                reader_body(r),
            )
                .into_response()
        }

        None => {
            VIEW.piece_store.get(RESULT_MISS);
            let url = proxy.resource_url(&c);
            debug!(piece = %c, url = url.as_str(), "redirect to market");
            (StatusCode::FOUND, [(header::LOCATION, url)]).into_response()
        }
    }
}

async fn put_piece(
    State(proxy): State<Arc<PieceStoreProxy>>,
    Path(raw): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let c = match parse_cid(&raw) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let size = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let reader = StreamReader::new(
        body.into_data_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e)),
    );
    let mut sync_reader = SyncIoBridge::new(reader);

    let res = tokio::task::spawn_blocking(move || proxy.put(&c, &mut sync_reader, size)).await;

    match res {
        Ok(Ok(_)) => StatusCode::OK.into_response(),

        Ok(Err(e)) => {
            error!(piece = %c, "put piece: {:?}", e);
            let msg = match kind(&e) {
                ErrorKind::Precondition => e.to_string(),
                _ => format!("put piece data: {:#}", e),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
        }

        Err(e) => {
            error!(piece = %c, "put piece: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("put piece data: {}", e)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use super::*;
    use crate::chain::mock::MockMarket;
    use crate::objstore::mock::MemStore;
    use crate::objstore::{ObjectStore, Resource};

    const PIECE: &str = "baga6ea4seaqdb5jftgpyv2rsxatevpzfb5i5747roq57jb2n3mnkjmz3etcreda";

    fn setup(stores: Vec<Arc<dyn ObjectStore>>) -> Router {
        router(Arc::new(PieceStoreProxy::new(stores, Arc::new(MockMarket))))
    }

    fn request(method: Method, uri: &str, body: Body) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(body).unwrap()
    }

    #[tokio::test]
    async fn test_get_local() {
        let store = Arc::new(MemStore::new("pieces", false, 0));
        store.insert(&Resource::Custom(PIECE.to_owned()), b"piece data");

        let resp = setup(vec![store as Arc<dyn ObjectStore>])
            .oneshot(request(Method::GET, &format!("/{}", PIECE), Body::empty()))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"piece data");
    }

    #[tokio::test]
    async fn test_get_redirect() {
        let resp = setup(vec![Arc::new(MemStore::new("pieces", false, 0)) as Arc<dyn ObjectStore>])
            .oneshot(request(Method::GET, &format!("/{}", PIECE), Body::empty()))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap().to_str().unwrap(),
            format!("http://market.local/resource?resource-id={}", PIECE)
        );
    }

    #[tokio::test]
    async fn test_bad_cid() {
        let resp = setup(vec![])
            .oneshot(request(Method::GET, "/not-a-cid", Body::empty()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_put() {
        let full = Arc::new(MemStore::new("full", false, 4));
        let spare = Arc::new(MemStore::new("spare", false, 1 << 30));
        let app = setup(vec![full.clone() as Arc<dyn ObjectStore>, spare.clone()]);

        let req = Request::builder()
            .method(Method::PUT)
            .uri(format!("/{}", PIECE))
            .header(header::CONTENT_LENGTH, "10")
            .body(Body::from("piece data"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let res = Resource::Custom(PIECE.to_owned());
        assert!(!full.contains(&res));
        assert!(spare.contains(&res));
    }

    #[tokio::test]
    async fn test_put_exhausted() {
        let app = setup(vec![Arc::new(MemStore::new("ro", true, 0)) as Arc<dyn ObjectStore>]);

        let resp = app
            .oneshot(request(Method::PUT, &format!("/{}", PIECE), Body::from("piece data")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"no piece store available");
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let resp = setup(vec![])
            .oneshot(request(Method::POST, &format!("/{}", PIECE), Body::empty()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
