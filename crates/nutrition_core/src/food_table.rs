//! Curated nutrition table bundled with the crate. Values are per serving.

use crate::resolver::normalize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CuratedFood {
    pub name: &'static str,
    pub emoji: &'static str,
    pub calories: f64,
    pub sugar: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub serving_size: &'static str,
    pub category: &'static str,
}

macro_rules! food {
    ($name:expr, $emoji:expr, $cal:expr, $sugar:expr, $protein:expr, $carbs:expr, $fat:expr, $fiber:expr, $serving:expr, $category:expr) => {
        CuratedFood {
            name: $name,
            emoji: $emoji,
            calories: $cal,
            sugar: $sugar,
            protein: $protein,
            carbs: $carbs,
            fat: $fat,
            fiber: $fiber,
            serving_size: $serving,
            category: $category,
        }
    };
}

pub static CURATED_FOODS: &[CuratedFood] = &[
    // Fruit
    food!("Apple", "🍎", 95.0, 19.0, 0.5, 25.0, 0.3, 4.4, "1 medium (182g)", "fruit"),
    food!("Green Apple", "🍏", 80.0, 15.0, 0.4, 21.0, 0.2, 3.7, "1 medium (160g)", "fruit"),
    food!("Banana", "🍌", 105.0, 14.0, 1.3, 27.0, 0.4, 3.1, "1 medium (118g)", "fruit"),
    food!("Orange", "🍊", 62.0, 12.0, 1.2, 15.0, 0.2, 3.1, "1 medium (131g)", "fruit"),
    food!("Strawberries", "🍓", 49.0, 7.4, 1.0, 11.7, 0.5, 3.0, "1 cup (152g)", "fruit"),
    food!("Grapes", "🍇", 104.0, 23.0, 1.1, 27.0, 0.2, 1.4, "1 cup (151g)", "fruit"),
    food!("Watermelon", "🍉", 46.0, 9.4, 0.9, 11.5, 0.2, 0.6, "1 cup diced (152g)", "fruit"),
    food!("Pineapple", "🍍", 82.0, 16.0, 0.9, 22.0, 0.2, 2.3, "1 cup chunks (165g)", "fruit"),
    food!("Mango", "🥭", 99.0, 23.0, 1.4, 25.0, 0.6, 2.6, "1 cup sliced (165g)", "fruit"),
    food!("Avocado", "🥑", 240.0, 1.0, 3.0, 12.8, 22.0, 10.0, "1 medium (150g)", "fruit"),
    // Vegetables
    food!("Broccoli", "🥦", 31.0, 1.5, 2.5, 6.0, 0.3, 2.4, "1 cup chopped (91g)", "vegetable"),
    food!("Carrot", "🥕", 25.0, 2.9, 0.6, 6.0, 0.1, 1.7, "1 medium (61g)", "vegetable"),
    food!("Salad", "🥗", 20.0, 1.5, 1.5, 3.5, 0.2, 2.0, "1 bowl (100g)", "vegetable"),
    food!("Tomato", "🍅", 22.0, 3.2, 1.1, 4.8, 0.2, 1.5, "1 medium (123g)", "vegetable"),
    food!("Cucumber", "🥒", 16.0, 1.7, 0.7, 3.8, 0.1, 0.5, "1 cup sliced (104g)", "vegetable"),
    food!("Potato", "🥔", 161.0, 2.1, 4.3, 37.0, 0.2, 3.8, "1 medium baked (173g)", "vegetable"),
    food!("Corn", "🌽", 88.0, 6.4, 3.3, 19.0, 1.4, 2.0, "1 ear (103g)", "vegetable"),
    // Protein
    food!("Egg", "🥚", 72.0, 0.2, 6.3, 0.4, 4.8, 0.0, "1 large (50g)", "protein"),
    food!("Chicken Breast", "🍗", 165.0, 0.0, 31.0, 0.0, 3.6, 0.0, "100g cooked", "protein"),
    food!("Steak", "🥩", 271.0, 0.0, 26.0, 0.0, 18.0, 0.0, "100g cooked", "protein"),
    food!("Salmon", "🐟", 208.0, 0.0, 20.0, 0.0, 13.0, 0.0, "100g cooked", "protein"),
    food!("Shrimp", "🍤", 99.0, 0.0, 24.0, 0.2, 0.3, 0.0, "100g cooked", "protein"),
    food!("Tofu", "🧊", 144.0, 0.6, 17.0, 2.8, 8.7, 2.3, "100g firm", "protein"),
    food!("Peanuts", "🥜", 161.0, 1.3, 7.3, 4.6, 14.0, 2.4, "1 oz (28g)", "protein"),
    // Grains
    food!("Rice", "🍚", 206.0, 0.1, 4.3, 45.0, 0.4, 0.6, "1 cup cooked (158g)", "grain"),
    food!("Bread", "🍞", 79.0, 1.4, 2.7, 15.0, 1.0, 0.8, "1 slice (32g)", "grain"),
    food!("Toast", "🍞", 87.0, 1.5, 3.0, 16.0, 1.1, 0.9, "1 slice toasted (30g)", "grain"),
    food!("Croissant", "🥐", 231.0, 6.4, 4.7, 26.0, 12.0, 1.5, "1 medium (57g)", "grain"),
    food!("Spaghetti", "🍝", 221.0, 0.8, 8.1, 43.0, 1.3, 2.5, "1 cup cooked (140g)", "grain"),
    food!("Oatmeal", "🥣", 154.0, 1.1, 5.4, 27.0, 2.6, 4.0, "1 cup cooked (234g)", "grain"),
    // Dairy
    food!("Milk", "🥛", 149.0, 12.0, 7.7, 12.0, 8.0, 0.0, "1 cup (244g)", "dairy"),
    food!("Cheese", "🧀", 113.0, 0.1, 7.0, 0.4, 9.3, 0.0, "1 oz (28g)", "dairy"),
    food!("Yogurt", "🍶", 149.0, 11.0, 8.5, 11.0, 8.0, 0.0, "1 cup (245g)", "dairy"),
    // Fast food and snacks
    food!("Pizza", "🍕", 285.0, 3.8, 12.0, 36.0, 10.0, 2.5, "1 slice (107g)", "fast food"),
    food!("Hamburger", "🍔", 354.0, 6.0, 20.0, 29.0, 17.0, 1.3, "1 burger (110g)", "fast food"),
    food!("French Fries", "🍟", 312.0, 0.3, 3.4, 41.0, 15.0, 3.8, "1 medium (117g)", "fast food"),
    food!("Hot Dog", "🌭", 290.0, 4.0, 10.0, 24.0, 17.0, 0.8, "1 hot dog (98g)", "fast food"),
    food!("Donut", "🍩", 253.0, 14.0, 2.7, 29.0, 14.0, 0.9, "1 medium (60g)", "snack"),
    food!("Chocolate", "🍫", 155.0, 14.0, 2.2, 17.0, 9.0, 2.0, "1 oz (28g)", "snack"),
    food!("Cookie", "🍪", 148.0, 10.0, 1.5, 20.0, 7.0, 0.7, "1 large (30g)", "snack"),
    // Drinks
    food!("Coffee", "☕", 2.0, 0.0, 0.3, 0.0, 0.0, 0.0, "1 cup (240ml)", "drink"),
    food!("Orange Juice", "🧃", 112.0, 21.0, 1.7, 26.0, 0.5, 0.5, "1 cup (248ml)", "drink"),
    food!("Cola", "🥤", 140.0, 39.0, 0.0, 39.0, 0.0, 0.0, "1 can (355ml)", "drink"),
];

/// Exact match on the normalized name, or on "emoji name" / "emojiname".
pub fn find_exact(query: &str) -> Option<&'static CuratedFood> {
    let query = normalize(query);
    CURATED_FOODS.iter().find(|food| {
        let name = normalize(food.name);
        name == query
            || normalize(&format!("{} {}", food.emoji, food.name)) == query
            || normalize(&format!("{}{}", food.emoji, food.name)) == query
    })
}

/// Case-insensitive substring search over curated names.
pub fn search(query: &str) -> Vec<&'static CuratedFood> {
    let query = normalize(query);
    if query.is_empty() {
        return Vec::new();
    }
    CURATED_FOODS
        .iter()
        .filter(|food| normalize(food.name).contains(&query))
        .collect()
}
