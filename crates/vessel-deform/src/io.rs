//! File I/O: Gmsh 2.2 meshes, centerlines, correspondence side tables and STL
//! surface export.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use hashbrown::HashMap;
use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::centerline::Centerline;
use crate::columns::PrismColumns;
use crate::error::{DeformError, DeformResult};
use crate::quality::Triangle;
use crate::types::{Cell, CellKind, MeshVariant, PhysicalName, Region, VolumeMesh};

/// Per-face property holding the station index in the side table.
pub const CORRESPONDENCE_PROPERTY: &str = "face_correspond_node_index";

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    /// Gmsh 2.2 ASCII element list.
    Msh,
    /// Triangle surface.
    Stl,
    /// Correspondence side table.
    Ply,
}

impl MeshFormat {
    /// Detect format from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .and_then(|ext| match ext.as_str() {
                "msh" => Some(MeshFormat::Msh),
                "stl" => Some(MeshFormat::Stl),
                "ply" => Some(MeshFormat::Ply),
                _ => None,
            })
    }
}

fn unsupported(path: &Path) -> DeformError {
    DeformError::unsupported_format(path.extension().and_then(|e| e.to_str()).map(String::from))
}

/// Load a volume mesh, detecting the format from the extension.
pub fn load_mesh(path: &Path, variant: MeshVariant) -> DeformResult<VolumeMesh> {
    match MeshFormat::from_path(path) {
        Some(MeshFormat::Msh) => load_msh(path, variant),
        _ => Err(unsupported(path)),
    }
}

/// Save a volume mesh, detecting the format from the extension.
///
/// `.stl` writes only the wall triangles.
pub fn save_mesh(mesh: &VolumeMesh, path: &Path) -> DeformResult<()> {
    match MeshFormat::from_path(path) {
        Some(MeshFormat::Msh) => save_msh(mesh, path),
        Some(MeshFormat::Stl) => {
            let faces: Vec<[u32; 3]> = mesh
                .cells_in(Region::Wall)
                .chain(mesh.cells_in(Region::InnerWall))
                .filter_map(|(_, c)| c.triangle_nodes())
                .collect();
            save_stl(mesh, &faces, path)
        }
        _ => Err(unsupported(path)),
    }
}

impl VolumeMesh {
    /// Load from a file, detecting the format from the extension.
    pub fn load(path: impl AsRef<Path>, variant: MeshVariant) -> DeformResult<Self> {
        load_mesh(path.as_ref(), variant)
    }

    /// Save to a file, detecting the format from the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> DeformResult<()> {
        save_mesh(self, path.as_ref())
    }
}

/// Numbered lines of a text file, skipping blank ones.
struct LineCursor<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    path: &'a Path,
}

impl<'a> LineCursor<'a> {
    fn new(text: &'a str, path: &'a Path) -> Self {
        Self {
            lines: text.lines().enumerate(),
            path,
        }
    }

    /// Next non-blank line as `(1-based line number, trimmed text)`.
    fn next(&mut self) -> Option<(usize, &'a str)> {
        self.lines
            .by_ref()
            .map(|(i, l)| (i + 1, l.trim()))
            .find(|(_, l)| !l.is_empty())
    }

    fn expect_line(&mut self, what: &str) -> DeformResult<(usize, &'a str)> {
        self.next().ok_or_else(|| {
            DeformError::parse_error(self.path, format!("unexpected end of file, expected {}", what))
        })
    }

    fn expect_tag(&mut self, tag: &str) -> DeformResult<()> {
        let (line, text) = self.expect_line(tag)?;
        if text != tag {
            return Err(self.error(line, format!("expected {}, found {:?}", tag, text)));
        }
        Ok(())
    }

    fn expect_count(&mut self, what: &str) -> DeformResult<usize> {
        let (line, text) = self.expect_line(what)?;
        text.parse()
            .map_err(|_| self.error(line, format!("invalid {} {:?}", what, text)))
    }

    fn error(&self, line: usize, details: impl Into<String>) -> DeformError {
        DeformError::parse_error_at(self.path, line, details)
    }
}

fn parse_fields<T: std::str::FromStr>(
    cursor: &LineCursor<'_>,
    line: usize,
    text: &str,
) -> DeformResult<Vec<T>> {
    text.split_whitespace()
        .map(|f| {
            f.parse()
                .map_err(|_| cursor.error(line, format!("invalid number {:?}", f)))
        })
        .collect()
}

fn read_text(path: &Path) -> DeformResult<String> {
    std::fs::read_to_string(path).map_err(|e| DeformError::io_read(path, e))
}

/// Load a Gmsh 2.2 ASCII mesh. Node ids are converted to 0-based positions.
///
/// Elements of types other than triangle, quadrilateral, tetrahedron and
/// prism (points, lines) are skipped.
pub fn load_msh(path: &Path, variant: MeshVariant) -> DeformResult<VolumeMesh> {
    info!("Loading mesh from {:?}", path);
    let text = read_text(path)?;
    let mut cursor = LineCursor::new(&text, path);
    let mut mesh = VolumeMesh::new(variant);
    let mut node_ids: HashMap<u64, u32> = HashMap::new();
    let mut skipped = 0usize;

    while let Some((line, section)) = cursor.next() {
        match section {
            "$MeshFormat" => {
                let (line, header) = cursor.expect_line("format header")?;
                let fields: Vec<&str> = header.split_whitespace().collect();
                match fields.as_slice() {
                    [version, "0", ..] if version.starts_with("2.") => {}
                    _ => {
                        return Err(cursor.error(
                            line,
                            format!("only Gmsh 2.x ASCII is supported, found {:?}", header),
                        ));
                    }
                }
                cursor.expect_tag("$EndMeshFormat")?;
            }
            "$PhysicalNames" => {
                let count = cursor.expect_count("physical name count")?;
                for _ in 0..count {
                    let (line, text) = cursor.expect_line("physical name")?;
                    let mut parts = text.splitn(3, char::is_whitespace);
                    let (Some(dim), Some(id), Some(name)) = (parts.next(), parts.next(), parts.next())
                    else {
                        return Err(cursor.error(line, "physical name needs dimension, id and name"));
                    };
                    mesh.physical_names.push(PhysicalName {
                        dimension: dim
                            .parse()
                            .map_err(|_| cursor.error(line, "invalid physical dimension"))?,
                        id: id.parse().map_err(|_| cursor.error(line, "invalid physical id"))?,
                        name: name.trim().trim_matches('"').to_string(),
                    });
                }
                cursor.expect_tag("$EndPhysicalNames")?;
            }
            "$Nodes" => {
                let count = cursor.expect_count("node count")?;
                mesh.vertices.reserve(count);
                for _ in 0..count {
                    let (line, text) = cursor.expect_line("node")?;
                    let mut fields = text.split_whitespace();
                    let id: u64 = fields
                        .next()
                        .and_then(|f| f.parse().ok())
                        .ok_or_else(|| cursor.error(line, "invalid node id"))?;
                    let coords = fields
                        .map(|f| {
                            f.parse::<f64>()
                                .map_err(|_| cursor.error(line, format!("invalid coordinate {:?}", f)))
                        })
                        .collect::<DeformResult<Vec<f64>>>()?;
                    let [x, y, z] = coords[..] else {
                        return Err(cursor.error(line, "node needs three coordinates"));
                    };
                    let index = mesh.add_vertex(Point3::new(x, y, z));
                    if node_ids.insert(id, index).is_some() {
                        return Err(cursor.error(line, format!("duplicate node id {}", id)));
                    }
                }
                cursor.expect_tag("$EndNodes")?;
            }
            "$Elements" => {
                let count = cursor.expect_count("element count")?;
                mesh.cells.reserve(count);
                for _ in 0..count {
                    let (line, text) = cursor.expect_line("element")?;
                    let fields: Vec<u64> = parse_fields(&cursor, line, text)?;
                    let (code, ntags, rest) = match fields.as_slice() {
                        [_, code, ntags, rest @ ..] => (*code, *ntags as usize, rest),
                        _ => return Err(cursor.error(line, "element line is too short")),
                    };
                    if rest.len() < ntags {
                        return Err(cursor.error(line, "element has fewer tags than declared"));
                    }
                    let Some(kind) = CellKind::from_code(code as u32) else {
                        skipped += 1;
                        continue;
                    };
                    let (tags, node_fields) = rest.split_at(ntags);
                    if node_fields.len() != kind.node_count() {
                        return Err(cursor.error(
                            line,
                            format!(
                                "{:?} needs {} nodes, found {}",
                                kind,
                                kind.node_count(),
                                node_fields.len()
                            ),
                        ));
                    }
                    let nodes = node_fields
                        .iter()
                        .map(|id| {
                            node_ids
                                .get(id)
                                .copied()
                                .ok_or_else(|| cursor.error(line, format!("unknown node id {}", id)))
                        })
                        .collect::<DeformResult<Vec<u32>>>()?;

                    let mut cell = Cell::new(
                        kind,
                        tags.first().copied().unwrap_or(0) as u32,
                        tags.get(1).copied().unwrap_or(0) as u32,
                        nodes,
                    );
                    cell.aux_tag = ntags as u32;
                    mesh.add_cell(cell);
                }
                cursor.expect_tag("$EndElements")?;
            }
            other if other.starts_with('$') => {
                let end = format!("$End{}", &other[1..]);
                debug!(section = other, "Skipping section");
                while cursor.next().is_some_and(|(_, l)| l != end) {}
            }
            other => {
                return Err(cursor.error(line, format!("unexpected content {:?}", other)));
            }
        }
    }

    if skipped > 0 {
        warn!(elements = skipped, "Skipped point and line elements");
    }
    info!(
        vertices = mesh.vertex_count(),
        cells = mesh.cell_count(),
        "Loaded mesh"
    );
    Ok(mesh)
}

fn write_err(path: &Path) -> impl Fn(std::io::Error) -> DeformError + '_ {
    move |e| DeformError::io_write(path, e)
}

/// Save a mesh as Gmsh 2.2 ASCII with 1-based node ids.
pub fn save_msh(mesh: &VolumeMesh, path: &Path) -> DeformResult<()> {
    info!("Saving mesh to {:?}", path);
    let file = File::create(path).map_err(write_err(path))?;
    let mut w = BufWriter::new(file);
    write_msh(mesh, &mut w).map_err(write_err(path))?;
    w.flush().map_err(write_err(path))?;
    info!(
        vertices = mesh.vertex_count(),
        cells = mesh.cell_count(),
        "Saved mesh"
    );
    Ok(())
}

fn write_msh(mesh: &VolumeMesh, w: &mut impl Write) -> std::io::Result<()> {
    writeln!(w, "$MeshFormat\n2.2 0 8\n$EndMeshFormat")?;
    if !mesh.physical_names.is_empty() {
        writeln!(w, "$PhysicalNames\n{}", mesh.physical_names.len())?;
        for name in &mesh.physical_names {
            writeln!(w, "{} {} \"{}\"", name.dimension, name.id, name.name)?;
        }
        writeln!(w, "$EndPhysicalNames")?;
    }

    writeln!(w, "$Nodes\n{}", mesh.vertex_count())?;
    for (i, v) in mesh.vertices.iter().enumerate() {
        let p = &v.position;
        writeln!(w, "{} {} {} {}", i + 1, p.x, p.y, p.z)?;
    }
    writeln!(w, "$EndNodes")?;

    writeln!(w, "$Elements\n{}", mesh.cell_count())?;
    for (i, cell) in mesh.cells.iter().enumerate() {
        write!(w, "{} {} {}", i + 1, cell.kind.code(), cell.aux_tag)?;
        let tags = [cell.physical_id, cell.entity_id];
        for k in 0..cell.aux_tag as usize {
            write!(w, " {}", tags.get(k).copied().unwrap_or(0))?;
        }
        for node in &cell.nodes {
            write!(w, " {}", node + 1)?;
        }
        writeln!(w)?;
    }
    writeln!(w, "$EndElements")
}

/// Read centerline points: a header line, then one `X Y Z` per line.
pub fn read_centerline_points(path: &Path) -> DeformResult<Vec<Point3<f64>>> {
    let text = read_text(path)?;
    let mut cursor = LineCursor::new(&text, path);
    cursor.expect_line("centerline header")?;

    let mut points = Vec::new();
    while let Some((line, text)) = cursor.next() {
        let coords: Vec<f64> = parse_fields(&cursor, line, text)?;
        let [x, y, z] = coords[..] else {
            return Err(cursor.error(line, format!("expected X Y Z, found {:?}", text)));
        };
        points.push(Point3::new(x, y, z));
    }
    debug!(points = points.len(), "Read centerline");
    Ok(points)
}

/// Read a centerline and compute its tangents.
pub fn load_centerline(path: &Path) -> DeformResult<Centerline> {
    Centerline::new(read_centerline_points(path)?)
}

/// Write centerline points with a point-count header.
pub fn save_centerline(points: &[Point3<f64>], path: &Path) -> DeformResult<()> {
    let file = File::create(path).map_err(write_err(path))?;
    let mut w = BufWriter::new(file);
    write_centerline(points, &mut w).map_err(write_err(path))?;
    w.flush().map_err(write_err(path))
}

fn write_centerline(points: &[Point3<f64>], w: &mut impl Write) -> std::io::Result<()> {
    writeln!(w, "{}", points.len())?;
    for p in points {
        writeln!(w, "{} {} {}", p.x, p.y, p.z)?;
    }
    Ok(())
}

fn get_ply_float(prop: Option<&ply_rs::ply::Property>, name: &str, path: &Path) -> DeformResult<f64> {
    use ply_rs::ply::Property;

    match prop {
        Some(Property::Float(v)) => Ok(*v as f64),
        Some(Property::Double(v)) => Ok(*v),
        Some(Property::Int(v)) => Ok(*v as f64),
        Some(Property::UInt(v)) => Ok(*v as f64),
        _ => Err(DeformError::parse_error(
            path,
            format!("missing or invalid PLY property: {}", name),
        )),
    }
}

fn get_ply_int(prop: Option<&ply_rs::ply::Property>, name: &str, path: &Path) -> DeformResult<i64> {
    use ply_rs::ply::Property;

    match prop {
        Some(Property::Char(v)) => Ok(*v as i64),
        Some(Property::UChar(v)) => Ok(*v as i64),
        Some(Property::Short(v)) => Ok(*v as i64),
        Some(Property::UShort(v)) => Ok(*v as i64),
        Some(Property::Int(v)) => Ok(*v as i64),
        Some(Property::UInt(v)) => Ok(*v as i64),
        _ => Err(DeformError::parse_error(
            path,
            format!("missing or invalid PLY property: {}", name),
        )),
    }
}

/// Surface stored in a correspondence side table.
#[derive(Debug, Clone, Default)]
pub struct CorrespondenceTable {
    pub points: Vec<Point3<f64>>,
    pub faces: Vec<[u32; 3]>,
    /// Station of each face, `None` where the table holds a negative index.
    pub stations: Vec<Option<usize>>,
}

/// Read a correspondence side table.
pub fn load_correspondence_table(path: &Path) -> DeformResult<CorrespondenceTable> {
    use ply_rs::parser::Parser;
    use ply_rs::ply::{DefaultElement, Property};

    let file = File::open(path).map_err(|e| DeformError::io_read(path, e))?;
    let mut reader = BufReader::new(file);
    let parser = Parser::<DefaultElement>::new();
    let ply = parser
        .read_ply(&mut reader)
        .map_err(|e| DeformError::parse_error(path, format!("PLY parse error: {:?}", e)))?;

    let mut table = CorrespondenceTable::default();
    if let Some(vertices) = ply.payload.get("vertex") {
        for v in vertices {
            table.points.push(Point3::new(
                get_ply_float(v.get("x"), "x", path)?,
                get_ply_float(v.get("y"), "y", path)?,
                get_ply_float(v.get("z"), "z", path)?,
            ));
        }
    }

    if let Some(faces) = ply.payload.get("face") {
        for face in faces {
            let indices: Vec<i64> = match face.get("vertex_indices") {
                Some(Property::ListInt(l)) => l.iter().map(|&i| i as i64).collect(),
                Some(Property::ListUInt(l)) => l.iter().map(|&i| i as i64).collect(),
                Some(Property::ListUChar(l)) => l.iter().map(|&i| i as i64).collect(),
                _ => {
                    return Err(DeformError::parse_error(path, "face without vertex_indices"));
                }
            };
            let [a, b, c] = indices[..] else {
                return Err(DeformError::parse_error(
                    path,
                    format!("side table faces must be triangles, found {} indices", indices.len()),
                ));
            };
            table.faces.push([a as u32, b as u32, c as u32]);

            let station = get_ply_int(face.get(CORRESPONDENCE_PROPERTY), CORRESPONDENCE_PROPERTY, path)?;
            table.stations.push(usize::try_from(station).ok());
        }
    }

    debug!(
        points = table.points.len(),
        faces = table.faces.len(),
        "Loaded correspondence table"
    );
    Ok(table)
}

/// Write the wall triangles of every column with their stations.
///
/// Only vertices used by wall triangles are written, in first-use order.
/// Excluded columns are written as station `-1`.
pub fn save_correspondence_table(
    mesh: &VolumeMesh,
    columns: &PrismColumns,
    stations: &[Option<usize>],
    path: &Path,
) -> DeformResult<()> {
    use ply_rs::ply::{
        Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
        ScalarType,
    };
    use ply_rs::writer::Writer;

    if stations.len() != columns.len() {
        return Err(DeformError::count_mismatch(
            "column stations",
            columns.len(),
            stations.len(),
        ));
    }

    let mut local: HashMap<u32, i32> = HashMap::new();
    let mut vertices_payload: Vec<DefaultElement> = Vec::new();
    let mut faces_payload: Vec<DefaultElement> = Vec::with_capacity(columns.len());

    for (column, station) in columns.iter().zip(stations) {
        let nodes = mesh.cells[column.wall()]
            .triangle_nodes()
            .ok_or_else(|| DeformError::topology("wall cell is not a triangle"))?;
        let mut indices = Vec::with_capacity(3);
        for node in nodes {
            let next = local.len() as i32;
            let id = *local.entry(node).or_insert_with(|| {
                let p = mesh.vertices[node as usize].position;
                let mut element = DefaultElement::new();
                element.insert("x".to_string(), Property::Float(p.x as f32));
                element.insert("y".to_string(), Property::Float(p.y as f32));
                element.insert("z".to_string(), Property::Float(p.z as f32));
                vertices_payload.push(element);
                next
            });
            indices.push(id);
        }

        let mut element = DefaultElement::new();
        element.insert("vertex_indices".to_string(), Property::ListInt(indices));
        element.insert(
            CORRESPONDENCE_PROPERTY.to_string(),
            Property::Int(station.map_or(-1, |s| s as i32)),
        );
        faces_payload.push(element);
    }

    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::Ascii;

    let mut vertex_def = ElementDef::new("vertex".to_string());
    for axis in ["x", "y", "z"] {
        vertex_def.properties.add(PropertyDef::new(
            axis.to_string(),
            PropertyType::Scalar(ScalarType::Float),
        ));
    }
    ply.header.elements.add(vertex_def);

    let mut face_def = ElementDef::new("face".to_string());
    face_def.properties.add(PropertyDef::new(
        "vertex_indices".to_string(),
        PropertyType::List(ScalarType::UChar, ScalarType::Int),
    ));
    face_def.properties.add(PropertyDef::new(
        CORRESPONDENCE_PROPERTY.to_string(),
        PropertyType::Scalar(ScalarType::Int),
    ));
    ply.header.elements.add(face_def);

    let vertex_count = vertices_payload.len();
    ply.payload.insert("vertex".to_string(), vertices_payload);
    ply.payload.insert("face".to_string(), faces_payload);

    let as_io = |e: std::io::Error| DeformError::io_write(path, e);
    ply.make_consistent().map_err(|e| {
        as_io(std::io::Error::other(format!("PLY consistency error: {:?}", e)))
    })?;

    let file = File::create(path).map_err(as_io)?;
    let mut writer = BufWriter::new(file);
    Writer::new()
        .write_ply(&mut writer, &mut ply)
        .map_err(as_io)?;
    writer.flush().map_err(as_io)?;

    info!(
        vertices = vertex_count,
        faces = columns.len(),
        "Saved correspondence table to {:?}",
        path
    );
    Ok(())
}

/// Write triangles of `mesh` to binary STL. Normals follow the face winding.
pub fn save_stl(mesh: &VolumeMesh, faces: &[[u32; 3]], path: &Path) -> DeformResult<()> {
    let triangles: Vec<stl_io::Triangle> = faces
        .iter()
        .map(|&[a, b, c]| {
            let p = |i: u32| {
                mesh.vertices
                    .get(i as usize)
                    .map(|v| v.position)
                    .ok_or_else(|| DeformError::topology(format!("face references missing vertex {}", i)))
            };
            let (p0, p1, p2) = (p(a)?, p(b)?, p(c)?);
            let n = Triangle::new(p0, p1, p2)
                .normal()
                .unwrap_or_else(nalgebra::Vector3::zeros);
            let v = |q: Point3<f64>| stl_io::Vertex::new([q.x as f32, q.y as f32, q.z as f32]);
            Ok(stl_io::Triangle {
                normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                vertices: [v(p0), v(p1), v(p2)],
            })
        })
        .collect::<DeformResult<_>>()?;

    let file = File::create(path).map_err(write_err(path))?;
    let mut writer = BufWriter::new(file);
    stl_io::write_stl(&mut writer, triangles.iter()).map_err(write_err(path))?;
    writer.flush().map_err(write_err(path))?;

    info!("Saved {} triangles to {:?}", triangles.len(), path);
    Ok(())
}

/// Write the wall surface, one triangle per column.
pub fn save_wall_stl(mesh: &VolumeMesh, columns: &PrismColumns, path: &Path) -> DeformResult<()> {
    columns.check_cells(mesh)?;
    let faces: Vec<[u32; 3]> = columns
        .iter()
        .filter_map(|column| mesh.cells[column.wall()].triangle_nodes())
        .collect();
    save_stl(mesh, &faces, path)
}

/// Write the innermost prism surface, the interface an inner volume must match.
pub fn save_innermost_stl(
    mesh: &VolumeMesh,
    columns: &PrismColumns,
    path: &Path,
) -> DeformResult<()> {
    columns.check_cells(mesh)?;
    save_stl(mesh, &columns.innermost_faces(mesh), path)
}

/// Read the vertices of an STL surface.
pub fn load_stl_points(path: &Path) -> DeformResult<Vec<Point3<f64>>> {
    let file = File::open(path).map_err(|e| DeformError::io_read(path, e))?;
    let mut reader = BufReader::new(file);
    let stl = stl_io::read_stl(&mut reader)
        .map_err(|e| DeformError::parse_error(path, format!("STL parse error: {}", e)))?;
    Ok(stl
        .vertices
        .iter()
        .map(|v| Point3::new(v.0[0] as f64, v.0[1] as f64, v.0[2] as f64))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::tests::extruded_pair;
    use crate::types::physical;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_msh() -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".msh").unwrap();
        write!(
            file,
            "$MeshFormat
2.2 0 8
$EndMeshFormat
$PhysicalNames
2
2 10 \"wall\"
3 100 \"interior\"
$EndPhysicalNames
$Nodes
4
1 0 0 0
2 1 0 0
3 0 1 0
4 0 0 1
$EndNodes
$Elements
3
1 15 2 0 1 1
2 2 2 10 5 1 2 3
3 4 2 100 1 1 2 3 4
$EndElements
"
        )
        .unwrap();
        file
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(MeshFormat::from_path(Path::new("a.msh")), Some(MeshFormat::Msh));
        assert_eq!(MeshFormat::from_path(Path::new("a.STL")), Some(MeshFormat::Stl));
        assert_eq!(MeshFormat::from_path(Path::new("a.ply")), Some(MeshFormat::Ply));
        assert_eq!(MeshFormat::from_path(Path::new("a.vtk")), None);
        assert!(matches!(
            load_mesh(Path::new("a.vtk"), MeshVariant::PrismLayer),
            Err(DeformError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_load_msh() {
        let file = create_test_msh();
        let mesh = load_msh(file.path(), MeshVariant::Merged).expect("valid msh");
        assert_eq!(mesh.vertex_count(), 4);
        // The point element is skipped.
        assert_eq!(mesh.cell_count(), 2);
        assert_eq!(mesh.cells[0].nodes, vec![0, 1, 2]);
        assert_eq!(mesh.cells[0].physical_id, physical::WALL);
        assert_eq!(mesh.cells[0].entity_id, 5);
        assert_eq!(mesh.cells[1].kind, CellKind::Tetrahedron);
        assert_eq!(mesh.physical_names.len(), 2);
        assert_eq!(mesh.physical_names[0].name, "wall");
    }

    #[test]
    fn test_msh_round_trip() {
        let mut mesh = extruded_pair(2);
        mesh.physical_names.push(PhysicalName {
            dimension: 2,
            id: physical::WALL,
            name: "wall".to_string(),
        });
        mesh.vertices[3].position.x = 0.123456789012345;

        let file = NamedTempFile::with_suffix(".msh").unwrap();
        save_mesh(&mesh, file.path()).expect("save");
        let loaded = load_mesh(file.path(), MeshVariant::PrismLayer).expect("load");

        assert_eq!(loaded.positions(), mesh.positions());
        assert_eq!(loaded.cells, mesh.cells);
        assert_eq!(loaded.physical_names, mesh.physical_names);
    }

    #[test]
    fn test_msh_bad_node_reference() {
        let mut file = NamedTempFile::with_suffix(".msh").unwrap();
        write!(
            file,
            "$MeshFormat\n2.2 0 8\n$EndMeshFormat\n$Nodes\n1\n1 0 0 0\n$EndNodes\n$Elements\n1\n1 2 2 10 1 1 2 3\n$EndElements\n"
        )
        .unwrap();
        match load_msh(file.path(), MeshVariant::PrismLayer) {
            Err(DeformError::ParseError { line, .. }) => assert_eq!(line, Some(10)),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_msh_rejects_binary() {
        let mut file = NamedTempFile::with_suffix(".msh").unwrap();
        write!(file, "$MeshFormat\n2.2 1 8\n$EndMeshFormat\n").unwrap();
        assert!(load_msh(file.path(), MeshVariant::PrismLayer).is_err());
    }

    #[test]
    fn test_centerline_round_trip() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.5, 1.0),
            Point3::new(0.25, 1.0, 2.0),
        ];
        let file = NamedTempFile::with_suffix(".txt").unwrap();
        save_centerline(&points, file.path()).expect("save");
        assert_eq!(read_centerline_points(file.path()).expect("load"), points);
        assert_eq!(load_centerline(file.path()).expect("centerline").len(), 3);
    }

    #[test]
    fn test_centerline_parse_error() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        write!(file, "3\n0 0 0\n\n0 0 1\n0 0 x\n").unwrap();
        match read_centerline_points(file.path()) {
            Err(DeformError::ParseError { line, .. }) => assert_eq!(line, Some(5)),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_correspondence_table_round_trip() {
        let mesh = extruded_pair(1);
        let columns = PrismColumns::from_layered(&mesh, 1).unwrap();
        let stations = vec![Some(3), None];

        let file = NamedTempFile::with_suffix(".ply").unwrap();
        save_correspondence_table(&mesh, &columns, &stations, file.path()).expect("save");
        let table = load_correspondence_table(file.path()).expect("load");

        assert_eq!(table.stations, stations);
        assert_eq!(table.points.len(), 4);
        assert_eq!(table.faces, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_correspondence_table_count_mismatch() {
        let mesh = extruded_pair(1);
        let columns = PrismColumns::from_layered(&mesh, 1).unwrap();
        let file = NamedTempFile::with_suffix(".ply").unwrap();
        assert!(matches!(
            save_correspondence_table(&mesh, &columns, &[Some(0)], file.path()),
            Err(DeformError::InputCountMismatch { .. })
        ));
    }

    #[test]
    fn test_load_legacy_uchar_table() {
        let mut file = NamedTempFile::with_suffix(".ply").unwrap();
        write!(
            file,
            "ply
format ascii 1.0
element vertex 3
property float x
property float y
property float z
element face 1
property list uchar int vertex_indices
property uchar face_correspond_node_index
end_header
0 0 0
1 0 0
0 1 0
3 0 1 2 7
"
        )
        .unwrap();
        let table = load_correspondence_table(file.path()).expect("load");
        assert_eq!(table.stations, vec![Some(7)]);
    }

    #[test]
    fn test_stl_export() {
        let mesh = extruded_pair(2);
        let columns = PrismColumns::from_layered(&mesh, 2).unwrap();

        let file = NamedTempFile::with_suffix(".stl").unwrap();
        save_innermost_stl(&mesh, &columns, file.path()).expect("save");
        let points = load_stl_points(file.path()).expect("load");
        assert_eq!(points.len(), 4);
        assert!(points.iter().all(|p| (p.z + 0.2).abs() < 1e-6));

        save_wall_stl(&mesh, &columns, file.path()).expect("save");
        let points = load_stl_points(file.path()).expect("load");
        assert!(points.iter().all(|p| p.z.abs() < 1e-6));
    }
}
