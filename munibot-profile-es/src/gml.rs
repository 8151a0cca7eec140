//! Reading municipality outlines out of INSPIRE administrative unit GML.

use geo_types::{Coord, LineString, Polygon};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use munibot_core::model::Boundary;
use munibot_core::ports::PortError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RingKind {
    Exterior,
    Interior,
}

#[derive(Debug, Default)]
struct PolygonBuilder {
    exterior: Option<LineString<f64>>,
    interiors: Vec<LineString<f64>>,
}

impl PolygonBuilder {
    fn finish(self) -> Result<Polygon<f64>, PortError> {
        let exterior = self
            .exterior
            .ok_or_else(|| PortError::Service("GML polygon without exterior ring".to_owned()))?;
        Ok(Polygon::new(exterior, self.interiors))
    }
}

/// Parse every `Polygon` and `PolygonPatch` of a GML document into a boundary.
///
/// Positions are expected in latitude/longitude order, as served for ETRS89
/// geographic coordinates, and are swapped to longitude/latitude. A document
/// without polygons yields an empty boundary.
///
/// # Errors
///
/// Returns [`PortError::Service`] for an OWS exception report or malformed rings
/// and [`PortError::Xml`] when the document is not well formed.
pub fn parse_boundary(xml: &str) -> Result<Boundary, PortError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut polygons = Vec::new();
    let mut current: Option<PolygonBuilder> = None;
    let mut ring = None;
    let mut pos_list: Option<(usize, String)> = None;
    let mut exception: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => match start.local_name().as_ref() {
                b"ExceptionReport" => exception = Some(String::new()),
                b"Polygon" | b"PolygonPatch" => current = Some(PolygonBuilder::default()),
                b"exterior" => ring = Some(RingKind::Exterior),
                b"interior" => ring = Some(RingKind::Interior),
                b"posList" => pos_list = Some((srs_dimension(&start), String::new())),
                _ => {}
            },
            Event::Text(text) => {
                let content = text.unescape()?;
                if let Some((_, positions)) = pos_list.as_mut() {
                    positions.push_str(&content);
                } else if let Some(message) = exception.as_mut() {
                    if !message.is_empty() {
                        message.push(' ');
                    }
                    message.push_str(content.trim());
                }
            }
            Event::End(end) => match end.local_name().as_ref() {
                b"posList" => {
                    if let Some((dimension, positions)) = pos_list.take() {
                        let line = parse_pos_list(&positions, dimension)?;
                        let builder = current.as_mut().ok_or_else(|| {
                            PortError::Service("GML ring outside of a polygon".to_owned())
                        })?;
                        match ring {
                            Some(RingKind::Interior) => builder.interiors.push(line),
                            _ => builder.exterior = Some(line),
                        }
                    }
                }
                b"exterior" | b"interior" => ring = None,
                b"Polygon" | b"PolygonPatch" => {
                    if let Some(builder) = current.take() {
                        polygons.push(builder.finish()?);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(message) = exception {
        return Err(PortError::Service(format!("WFS exception: {message}")));
    }
    Ok(Boundary::from_polygons(polygons))
}

fn srs_dimension(start: &BytesStart<'_>) -> usize {
    start
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == b"srsDimension")
        .and_then(|attr| std::str::from_utf8(&attr.value).ok()?.trim().parse().ok())
        .filter(|dimension| *dimension >= 2)
        .unwrap_or(2)
}

fn parse_pos_list(positions: &str, dimension: usize) -> Result<LineString<f64>, PortError> {
    let values = positions
        .split_whitespace()
        .map(|value| match value.parse::<f64>() {
            Ok(number) if number.is_finite() => Ok(number),
            Ok(_) => Err(PortError::Service(format!("non-finite GML coordinate {value:?}"))),
            Err(err) => Err(PortError::Service(format!("bad GML coordinate {value:?}: {err}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if values.len() % dimension != 0 {
        return Err(PortError::Service(format!(
            "GML posList has {} values, not a multiple of {dimension}",
            values.len()
        )));
    }

    let coords: Vec<Coord<f64>> = values
        .chunks(dimension)
        .filter_map(|position| match position {
            [lat, lon, ..] => Some(Coord { x: *lon, y: *lat }),
            _ => None,
        })
        .collect();

    if coords.len() < 3 {
        return Err(PortError::Service(format!(
            "GML ring with {} positions",
            coords.len()
        )));
    }
    Ok(LineString::new(coords))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MUNICIPALITY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:FeatureCollection xmlns:wfs="http://www.opengis.net/wfs/2.0" xmlns:gml="http://www.opengis.net/gml/3.2"
    xmlns:au="http://inspire.ec.europa.eu/schemas/au/4.0" numberMatched="1" numberReturned="1">
  <wfs:member>
    <au:AdministrativeUnit gml:id="AU_ADMINISTRATIVEUNIT_34092828089">
      <au:geometry>
        <gml:MultiSurface gml:id="ms1" srsName="http://www.opengis.net/def/crs/EPSG/0/4258">
          <gml:surfaceMember>
            <gml:Polygon gml:id="p1">
              <gml:exterior>
                <gml:LinearRing>
                  <gml:posList srsDimension="2">40.0 -3.5 40.0 -3.0 40.5 -3.0 40.5 -3.5 40.0 -3.5</gml:posList>
                </gml:LinearRing>
              </gml:exterior>
              <gml:interior>
                <gml:LinearRing>
                  <gml:posList>40.2 -3.3 40.2 -3.2 40.3 -3.2 40.2 -3.3</gml:posList>
                </gml:LinearRing>
              </gml:interior>
            </gml:Polygon>
          </gml:surfaceMember>
          <gml:surfaceMember>
            <gml:Surface gml:id="s1">
              <gml:patches>
                <gml:PolygonPatch>
                  <gml:exterior>
                    <gml:LinearRing>
                      <gml:posList>41.0 -2.0 41.0 -1.9 41.1 -1.9 41.0 -2.0</gml:posList>
                    </gml:LinearRing>
                  </gml:exterior>
                </gml:PolygonPatch>
              </gml:patches>
            </gml:Surface>
          </gml:surfaceMember>
        </gml:MultiSurface>
      </au:geometry>
      <au:nationalCode>34092828089</au:nationalCode>
    </au:AdministrativeUnit>
  </wfs:member>
</wfs:FeatureCollection>"#;

    #[test]
    fn polygons_patches_and_holes_are_read() {
        let boundary = parse_boundary(MUNICIPALITY).expect("valid GML");
        let polygons = &boundary.polygons().0;
        assert_eq!(polygons.len(), 2);

        let first = polygons.first().expect("first polygon");
        assert_eq!(first.interiors().len(), 1);
        let second = polygons.get(1).expect("second polygon");
        assert!(second.interiors().is_empty(), "patch without holes");
    }

    #[test]
    fn positions_are_swapped_to_lon_lat() {
        let boundary = parse_boundary(MUNICIPALITY).expect("valid GML");
        let extent = boundary.extent().expect("non empty boundary");
        assert_eq!(
            (extent.min_x(), extent.min_y(), extent.max_x(), extent.max_y()),
            (-3.5, 40.0, -1.9, 41.1)
        );
    }

    #[test]
    fn three_dimensional_positions_drop_height() {
        let xml = r#"<gml:Polygon xmlns:gml="http://www.opengis.net/gml/3.2"><gml:exterior><gml:LinearRing>
            <gml:posList srsDimension="3">1 2 0 1 3 0 2 3 0 1 2 0</gml:posList>
            </gml:LinearRing></gml:exterior></gml:Polygon>"#;
        let boundary = parse_boundary(xml).expect("valid GML");
        let extent = boundary.extent().expect("non empty boundary");
        assert_eq!((extent.min_x(), extent.max_y()), (2.0, 2.0));
    }

    #[test]
    fn empty_collection_is_an_empty_boundary() {
        let xml = r#"<wfs:FeatureCollection xmlns:wfs="http://www.opengis.net/wfs/2.0"
            numberMatched="0" numberReturned="0"/>"#;
        assert!(parse_boundary(xml).expect("valid GML").is_empty(), "no polygons");
    }

    #[test]
    fn exception_report_is_a_service_error() {
        let xml = r#"<ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows/1.1" version="2.0.0">
            <ows:Exception exceptionCode="InvalidParameterValue">
              <ows:ExceptionText>Unknown stored query parameter</ows:ExceptionText>
            </ows:Exception>
          </ows:ExceptionReport>"#;
        match parse_boundary(xml) {
            Err(PortError::Service(message)) => {
                assert!(message.contains("Unknown stored query parameter"), "{message}");
            }
            other => panic!("expected a service error, got {other:?}"),
        }
    }

    #[test]
    fn odd_coordinate_count_is_rejected() {
        let xml = r#"<gml:Polygon xmlns:gml="http://www.opengis.net/gml/3.2"><gml:exterior><gml:LinearRing>
            <gml:posList>1 2 1 3 2 3 1</gml:posList>
            </gml:LinearRing></gml:exterior></gml:Polygon>"#;
        assert!(matches!(parse_boundary(xml), Err(PortError::Service(_))), "odd count");
    }

    #[test]
    fn non_finite_coordinates_are_rejected() {
        for value in ["NaN", "inf", "-infinity"] {
            let xml = format!(
                r#"<gml:Polygon xmlns:gml="http://www.opengis.net/gml/3.2"><gml:exterior>
                <gml:LinearRing><gml:posList>1 2 1 3 {value} 3 1 2</gml:posList></gml:LinearRing>
                </gml:exterior></gml:Polygon>"#
            );
            assert!(
                matches!(parse_boundary(&xml), Err(PortError::Service(_))),
                "{value} is rejected"
            );
        }
    }
}
