#![allow(clippy::all, missing_docs, unreachable_pub)]

tonic::include_proto!("csi.v1");
