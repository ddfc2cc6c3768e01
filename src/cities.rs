/// A named point on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub name: String,
    pub x: f64,
    pub y: f64,
}

impl City {
    pub fn new(name: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            name: name.into(),
            x,
            y,
        }
    }
}

const MORDOR: [(&str, f64, f64); 10] = [
    ("Barad-dûr", 50., 50.),
    ("Mount Doom", 60., 40.),
    ("Cirith Ungol", 30., 70.),
    ("Udûn", 45., 60.),
    ("Morannon", 40., 80.),
    ("Gorgoroth", 70., 30.),
    ("Minas Morgul", 20., 55.),
    ("Durthang", 55., 75.),
    ("Isenmouthe", 65., 85.),
    ("Narchost", 35., 45.),
];

/// The built-in city table.
pub fn mordor() -> Vec<City> {
    MORDOR
        .iter()
        .map(|&(name, x, y)| City::new(name, x, y))
        .collect()
}

/// The first `count` cities of the built-in table.
pub fn mordor_prefix(count: usize) -> Vec<City> {
    let mut cities = mordor();
    cities.truncate(count);
    cities
}

/// Position of the city called `name`, as used in tours.
pub fn index_of(cities: &[City], name: &str) -> Option<u32> {
    cities
        .iter()
        .position(|city| city.name == name)
        .map(|i| i as u32)
}
