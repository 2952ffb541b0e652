//! Debug logs: verified loop closures and communication statistics.
//!
//! The loop-closure log is rewritten from scratch on every new edge, so the
//! file trails the in-memory list by at most one write.

use std::path::Path;

use anyhow::{Context, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::geometry::SE3;
use crate::vlc::{VertexId, VlcEdge};

/// One row of the loop-closure log.
#[derive(Debug, Serialize, Deserialize)]
struct EdgeRow {
    robot1: u16,
    pose1: u32,
    robot2: u16,
    pose2: u32,
    qx: f64,
    qy: f64,
    qz: f64,
    qw: f64,
    tx: f64,
    ty: f64,
    tz: f64,
}

/// Write all edges, replacing any previous file.
pub fn write_edges<P: AsRef<Path>>(path: P, edges: &[VlcEdge]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    // The header is written explicitly so an empty log still has one.
    writer.write_record([
        "robot1", "pose1", "robot2", "pose2", "qx", "qy", "qz", "qw", "tx", "ty", "tz",
    ])?;

    for edge in edges {
        let [qx, qy, qz, qw] = edge.t_src_dst.quaternion_xyzw();
        let t = edge.t_src_dst.translation;
        writer.serialize(EdgeRow {
            robot1: edge.src.robot_id,
            pose1: edge.src.pose_id,
            robot2: edge.dst.robot_id,
            pose2: edge.dst.pose_id,
            qx,
            qy,
            qz,
            qw,
            tx: t.x,
            ty: t.y,
            tz: t.z,
        })?;
    }

    writer.flush()?;
    Ok(())
}

/// Read a loop-closure log back into edges.
pub fn read_edges<P: AsRef<Path>>(path: P) -> Result<Vec<VlcEdge>> {
    let path = path.as_ref();
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("failed to open {}", path.display()))?;

    let mut edges = Vec::new();
    for row in reader.deserialize() {
        let row: EdgeRow = row?;
        edges.push(VlcEdge::new(
            VertexId::new(row.robot1, row.pose1),
            VertexId::new(row.robot2, row.pose2),
            SE3::from_quaternion(row.qw, row.qx, row.qy, row.qz, Vector3::new(row.tx, row.ty, row.tz)),
        ));
    }
    Ok(edges)
}

/// One row of the communication-statistics log.
#[derive(Debug, Serialize)]
struct CommStatRow {
    robot_id: u16,
    bow_bytes: u64,
    vlc_bytes: u64,
}

/// Write per-peer received-byte counters.
pub fn write_comm_stats<P: AsRef<Path>>(
    path: P,
    bow_bytes: &[u64],
    vlc_bytes: &[u64],
) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    writer.write_record(["robot_id", "bow_bytes", "vlc_bytes"])?;

    for (robot_id, (&bow, &vlc)) in bow_bytes.iter().zip(vlc_bytes.iter()).enumerate() {
        writer.serialize(CommStatRow {
            robot_id: robot_id as u16,
            bow_bytes: bow,
            vlc_bytes: vlc,
        })?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use nalgebra::UnitQuaternion;

    use super::*;

    #[test]
    fn test_edge_log_roundtrip() {
        let edges = vec![
            VlcEdge::new(
                VertexId::new(0, 19),
                VertexId::new(0, 2),
                SE3::identity(),
            ),
            VlcEdge::new(
                VertexId::new(1, 40),
                VertexId::new(0, 7),
                SE3 {
                    rotation: UnitQuaternion::from_axis_angle(
                        &nalgebra::Unit::new_normalize(Vector3::new(0.0, 1.0, 0.0)),
                        0.25,
                    ),
                    translation: Vector3::new(1.5, -0.5, 3.0),
                },
            ),
        ];

        let file = tempfile::NamedTempFile::new().unwrap();
        write_edges(file.path(), &edges).unwrap();
        let reloaded = read_edges(file.path()).unwrap();

        assert_eq!(reloaded.len(), edges.len());
        for (a, b) in edges.iter().zip(reloaded.iter()) {
            assert_eq!(a.src, b.src);
            assert_eq!(a.dst, b.dst);
            assert!((a.t_src_dst.translation - b.t_src_dst.translation).norm() < 1e-12);
            assert!(a.t_src_dst.rotation.angle_to(&b.t_src_dst.rotation) < 1e-12);
        }
    }

    #[test]
    fn test_edge_log_header() {
        let file = tempfile::NamedTempFile::new().unwrap();
        write_edges(file.path(), &[]).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.starts_with("robot1,pose1,robot2,pose2,qx,qy,qz,qw,tx,ty,tz"));
    }

    #[test]
    fn test_rewrite_replaces_previous_content() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let edge = VlcEdge::new(VertexId::new(0, 1), VertexId::new(0, 0), SE3::identity());

        write_edges(file.path(), &[edge.clone(), edge.clone()]).unwrap();
        write_edges(file.path(), &[edge]).unwrap();

        assert_eq!(read_edges(file.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_comm_stats_written() {
        let file = tempfile::NamedTempFile::new().unwrap();
        write_comm_stats(file.path(), &[100, 0], &[0, 2048]).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.starts_with("robot_id,bow_bytes,vlc_bytes"));
        assert!(content.contains("0,100,0"));
        assert!(content.contains("1,0,2048"));
    }
}
