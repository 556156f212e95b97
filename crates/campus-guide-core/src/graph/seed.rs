//! Built-in campus topology and alias table.
//!
//! Every edge is listed from both endpoints. Alias order matters: the
//! substring pass of [`CampusGraph::resolve_name`](super::CampusGraph::resolve_name)
//! returns the first alias found in the message.

use super::{AliasSpec, GraphTable, NodeSpec};

type NodeRow = (&'static str, &'static str, &'static [(&'static str, u32)]);

const NODES: &[NodeRow] = &[
    ("0-entrada", "Entrada", &[("1-patio-central", 1)]),
    (
        "1-patio-central",
        "Patio Central",
        &[
            ("0-entrada", 1),
            ("18-maquinitas", 1),
            ("22-pabellon-4---piso-1", 1),
            ("25-entrada-biblioteca", 1),
            ("2-camino", 1),
        ],
    ),
    (
        "2-camino",
        "Camino",
        &[
            ("1-patio-central", 1),
            ("18-maquinitas", 1),
            ("4-pabellon-7", 1),
            ("13-cerca-del-ajedrez", 1),
        ],
    ),
    (
        "3-pabellon-4---piso-2-s",
        "Pabellón 4 - Piso 2 (S)",
        &[
            ("20-pabellon-4---piso-2-m", 1),
            ("24-pabellon-4", 1),
            ("5-area-de-salones-4b", 1),
        ],
    ),
    (
        "4-pabellon-7",
        "Pabellón 7",
        &[
            ("14-salon-701", 1),
            ("16-salon-702", 1),
            ("17-salon-704", 1),
            ("5-area-de-salones-4b", 1),
            ("7-area-de-tecnologia", 1),
            ("8-area-de-mecanica", 1),
            ("2-camino", 1),
        ],
    ),
    (
        "5-area-de-salones-4b",
        "Área de Salones 4B",
        &[
            ("4-pabellon-7", 1),
            ("24-pabellon-4", 1),
            ("3-pabellon-4---piso-2-s", 1),
            ("6-polideportivo", 1),
        ],
    ),
    (
        "6-polideportivo",
        "Polideportivo",
        &[("7-area-de-tecnologia", 1), ("5-area-de-salones-4b", 1)],
    ),
    (
        "7-area-de-tecnologia",
        "Área de Tecnología",
        &[
            ("6-polideportivo", 1),
            ("15-salones-de-mecanica", 1),
            ("8-area-de-mecanica", 1),
            ("5-area-de-salones-4b", 1),
            ("4-pabellon-7", 1),
            ("2-camino", 1),
        ],
    ),
    (
        "8-area-de-mecanica",
        "Área de Mecánica",
        &[
            ("12-zona-verde", 1),
            ("9-mecanica", 1),
            ("7-area-de-tecnologia", 1),
            ("5-area-de-salones-4b", 1),
            ("4-pabellon-7", 1),
            ("2-camino", 1),
        ],
    ),
    (
        "9-mecanica",
        "Mecánica",
        &[("8-area-de-mecanica", 1), ("10-segundo-piso-e", 1)],
    ),
    (
        "10-segundo-piso-e",
        "Segundo Piso (E)",
        &[("9-mecanica", 1), ("11-segundo-piso-s", 1)],
    ),
    (
        "11-segundo-piso-s",
        "Segundo Piso (S)",
        &[
            ("10-segundo-piso-e", 1),
            ("15-salones-de-mecanica", 1),
            ("27-pabellon-14", 1),
            ("7-area-de-tecnologia", 1),
        ],
    ),
    (
        "12-zona-verde",
        "Zona Verde",
        &[("8-area-de-mecanica", 1), ("13-cerca-del-ajedrez", 1)],
    ),
    (
        "13-cerca-del-ajedrez",
        "Cerca del Ajedrez",
        &[("12-zona-verde", 1), ("2-camino", 1)],
    ),
    ("14-salon-701", "Salón 701", &[("4-pabellon-7", 1)]),
    (
        "15-salones-de-mecanica",
        "Salones de Mecánica",
        &[
            ("11-segundo-piso-s", 1),
            ("7-area-de-tecnologia", 1),
            ("27-pabellon-14", 1),
        ],
    ),
    ("16-salon-702", "Salón 702", &[("4-pabellon-7", 1)]),
    ("17-salon-704", "Salón 704", &[("4-pabellon-7", 1)]),
    (
        "18-maquinitas",
        "Maquinitas",
        &[
            ("2-camino", 1),
            ("1-patio-central", 1),
            ("24-pabellon-4", 1),
            ("19-pabellon-4---piso-2-e", 1),
        ],
    ),
    (
        "19-pabellon-4---piso-2-e",
        "Pabellón 4 - Piso 2 (E)",
        &[
            ("18-maquinitas", 1),
            ("23-salon-pabellon-4", 1),
            ("20-pabellon-4---piso-2-m", 1),
        ],
    ),
    (
        "20-pabellon-4---piso-2-m",
        "Pabellón 4 - Piso 2 (M)",
        &[
            ("19-pabellon-4---piso-2-e", 1),
            ("21-pabellon-4---piso-2--a", 1),
            ("3-pabellon-4---piso-2-s", 1),
        ],
    ),
    (
        "21-pabellon-4---piso-2--a",
        "Pabellón 4 - Piso 2 (A)",
        &[("20-pabellon-4---piso-2-m", 1), ("22-pabellon-4---piso-1", 1)],
    ),
    (
        "22-pabellon-4---piso-1",
        "Pabellón 4 - Piso 1",
        &[("1-patio-central", 1), ("25-entrada-biblioteca", 1)],
    ),
    (
        "23-salon-pabellon-4",
        "Salón Pabellón 4",
        &[("19-pabellon-4---piso-2-e", 1)],
    ),
    (
        "24-pabellon-4",
        "Pabellón 4",
        &[("18-maquinitas", 1), ("5-area-de-salones-4b", 1)],
    ),
    (
        "25-entrada-biblioteca",
        "Entrada Biblioteca",
        &[
            ("26-biblioteca", 1),
            ("1-patio-central", 1),
            ("22-pabellon-4---piso-1", 1),
        ],
    ),
    ("26-biblioteca", "Biblioteca", &[("25-entrada-biblioteca", 1)]),
    (
        "27-pabellon-14",
        "Pabellón 14",
        &[
            ("15-salones-de-mecanica", 1),
            ("11-segundo-piso-s", 1),
            ("28-salon-1509", 1),
        ],
    ),
    ("28-salon-1509", "Salón 1509", &[("27-pabellon-14", 1)]),
];

const ALIASES: &[(&str, &str)] = &[
    ("entrada", "0-entrada"),
    ("ingreso", "0-entrada"),
    ("puerta", "0-entrada"),
    ("patio", "1-patio-central"),
    ("patio central", "1-patio-central"),
    ("centro", "1-patio-central"),
    ("camino", "2-camino"),
    ("pasillo", "2-camino"),
    ("biblioteca", "26-biblioteca"),
    ("biblio", "26-biblioteca"),
    ("entrada biblioteca", "25-entrada-biblioteca"),
    ("polideportivo", "6-polideportivo"),
    ("poli", "6-polideportivo"),
    ("gimnasio", "6-polideportivo"),
    ("deportes", "6-polideportivo"),
    ("tecnologia", "7-area-de-tecnologia"),
    ("area tecnologia", "7-area-de-tecnologia"),
    ("mecanica", "8-area-de-mecanica"),
    ("area mecanica", "8-area-de-mecanica"),
    ("zona verde", "12-zona-verde"),
    ("pabellon 4", "24-pabellon-4"),
    ("pabellon 7", "4-pabellon-7"),
    ("pabellon 14", "27-pabellon-14"),
    ("salon 701", "14-salon-701"),
    ("701", "14-salon-701"),
    ("salon 702", "16-salon-702"),
    ("702", "16-salon-702"),
    ("salon 704", "17-salon-704"),
    ("704", "17-salon-704"),
    ("salon 1509", "28-salon-1509"),
    ("1509", "28-salon-1509"),
    ("maquinitas", "18-maquinitas"),
    ("maquinas", "18-maquinitas"),
    ("ajedrez", "13-cerca-del-ajedrez"),
    ("cerca ajedrez", "13-cerca-del-ajedrez"),
];

/// The campus table the application ships with.
pub fn campus_table() -> GraphTable {
    GraphTable {
        nodes: NODES
            .iter()
            .map(|(key, name, edges)| NodeSpec {
                key: key.to_string(),
                name: name.to_string(),
                edges: edges
                    .iter()
                    .map(|(to, weight)| (to.to_string(), *weight))
                    .collect(),
            })
            .collect(),
        aliases: ALIASES
            .iter()
            .map(|(alias, key)| AliasSpec {
                alias: alias.to_string(),
                key: key.to_string(),
            })
            .collect(),
    }
}
